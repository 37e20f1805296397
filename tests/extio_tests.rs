use std::io::{BufRead, BufReader, Read, Write};
use std::os::unix::net::UnixStream;
use std::thread;
use std::time::Duration;
use webctl::error::ProtocolError;
use webctl::events::ChannelKind;
use webctl::extio::{attach_extension, read_message, write_message, ExtMessage, PROTOCOL_VERSION};
use webctl::runtime::Runtime;

#[test]
fn test_messages_cross_a_socket_intact() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    b.set_read_timeout(Some(Duration::from_secs(5))).unwrap();

    let long = "x".repeat(64 * 1024);
    let writer = {
        let long = long.clone();
        thread::spawn(move || {
            write_message(&mut a, &ExtMessage::Hello(PROTOCOL_VERSION)).unwrap();
            write_message(&mut a, &ExtMessage::Focus(long)).unwrap();
            write_message(&mut a, &ExtMessage::Blur(String::new())).unwrap();
        })
    };

    assert_eq!(read_message(&mut b).unwrap(), ExtMessage::Hello(1));
    assert_eq!(read_message(&mut b).unwrap(), ExtMessage::Focus(long));
    assert_eq!(read_message(&mut b).unwrap(), ExtMessage::Blur(String::new()));
    writer.join().unwrap();
}

#[test]
fn test_peer_closing_mid_payload_is_short_read() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    let mut header = 1i32.to_ne_bytes().to_vec();
    header.extend_from_slice(&16i32.to_ne_bytes());
    a.write_all(&header).unwrap();
    a.write_all(b"only8b\0\0").unwrap();
    drop(a);

    assert!(matches!(
        read_message(&mut b),
        Err(ProtocolError::ShortRead { expected: 16 })
    ));
}

#[test]
fn test_oversized_payload_rejected() {
    let (mut a, mut b) = UnixStream::pair().unwrap();
    let mut header = 1i32.to_ne_bytes().to_vec();
    header.extend_from_slice(&i32::MAX.to_ne_bytes());
    a.write_all(&header).unwrap();

    assert!(matches!(
        read_message(&mut b),
        Err(ProtocolError::InvalidSize(i32::MAX))
    ));
}

#[test]
fn test_extension_session_events() {
    let rt = Runtime::builder().name("ext").build();
    let (ours, theirs) = UnixStream::pair().unwrap();
    theirs.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    rt.bus().add_channel(ChannelKind::Connect, "test", ours);
    let mut events = BufReader::new(theirs);

    let (host, mut extension) = UnixStream::pair().unwrap();
    extension.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    let link = attach_extension(&rt, host).unwrap();

    assert_eq!(read_message(&mut extension).unwrap(), ExtMessage::Hello(1));
    write_message(&mut extension, &ExtMessage::Hello(1)).unwrap();
    write_message(&mut extension, &ExtMessage::Focus("textarea#body".into())).unwrap();

    let mut line = String::new();
    events.read_line(&mut line).unwrap();
    assert_eq!(line, "EVENT [ext] FOCUS_ELEMENT 'textarea#body'\n");

    // host-initiated close ends the session for the extension too
    link.close();
    let mut rest = Vec::new();
    extension.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}

#[test]
fn test_extension_dir_accepts_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let rt = Runtime::builder().name("page").build();
    let (ours, theirs) = UnixStream::pair().unwrap();
    theirs.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    rt.bus().add_channel(ChannelKind::Connect, "test", ours);
    let mut events = BufReader::new(theirs);

    rt.execute(&format!("set extension_dir = {}", dir.path().display()));
    let path = dir.path().join("webctl_extension_page");
    assert_eq!(rt.variable("extension_path"), path.display().to_string());

    let mut extension = UnixStream::connect(&path).unwrap();
    extension.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    assert_eq!(read_message(&mut extension).unwrap(), ExtMessage::Hello(1));
    write_message(&mut extension, &ExtMessage::Blur("input".into())).unwrap();

    let mut line = String::new();
    loop {
        line.clear();
        events.read_line(&mut line).unwrap();
        if !line.contains(" VARIABLE_SET ") {
            break;
        }
    }
    assert_eq!(line, "EVENT [page] BLUR_ELEMENT 'input'\n");

    rt.shutdown();
    assert!(!path.exists());
    let mut rest = Vec::new();
    extension.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty());
}
