// Live connection to a page extension

use super::{read_message, write_message, ExtMessage, PROTOCOL_VERSION};
use crate::error::ProtocolError;
use crate::events::{Event, EventKind};
use crate::runtime::Runtime;
use std::io::{self, BufReader};
use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::sync::{Arc, Mutex, Weak};
use std::thread;

/// Host side of an extension connection.
///
/// Writes go through one lock so header and payload of different messages
/// never interleave.
pub struct ExtensionLink {
    writer: Mutex<UnixStream>,
}

impl ExtensionLink {
    pub fn send(&self, message: &ExtMessage) -> io::Result<()> {
        let mut writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        write_message(&mut *writer, message)
    }

    /// Close both directions; the reader thread ends
    pub fn close(&self) {
        let writer = self.writer.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = writer.shutdown(Shutdown::Both);
    }
}

/// Greet the extension with `HELO` and forward its notifications as events
pub fn attach_extension(rt: &Arc<Runtime>, stream: UnixStream) -> io::Result<Arc<ExtensionLink>> {
    let reader = stream.try_clone()?;
    let link = Arc::new(ExtensionLink {
        writer: Mutex::new(stream),
    });
    link.send(&ExtMessage::Hello(PROTOCOL_VERSION))?;

    let weak = Arc::downgrade(rt);
    let peer = Arc::clone(&link);
    thread::Builder::new()
        .name("webctl-extio".into())
        .spawn(move || read_loop(weak, reader, peer))?;

    tracing::debug!(event = "extension_attached");
    Ok(link)
}

fn read_loop(rt: Weak<Runtime>, stream: UnixStream, link: Arc<ExtensionLink>) {
    let mut reader = BufReader::new(stream);
    loop {
        let message = match read_message(&mut reader) {
            Ok(message) => message,
            Err(ProtocolError::ShortRead { .. }) => {
                tracing::debug!(event = "extension_closed");
                break;
            }
            Err(e) => {
                tracing::warn!(event = "extension_protocol_error", error = %e);
                break;
            }
        };

        let Some(rt) = rt.upgrade() else {
            break;
        };
        match message {
            ExtMessage::Hello(version) if version != PROTOCOL_VERSION => {
                tracing::warn!(
                    event = "extension_version_mismatch",
                    ours = PROTOCOL_VERSION,
                    theirs = version
                );
            }
            ExtMessage::Hello(_) => {}
            ExtMessage::Focus(element) => {
                rt.send_event(&Event::new(EventKind::FocusElement).str(element));
            }
            ExtMessage::Blur(element) => {
                rt.send_event(&Event::new(EventKind::BlurElement).str(element));
            }
        }
    }
    link.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelKind;
    use crate::expand::Verbatim;
    use std::io::{BufRead, Read};
    use std::time::Duration;

    #[test]
    fn test_hello_then_focus_event() {
        let rt = Runtime::builder().name("x").expander(Verbatim).build();
        let (events_ours, events_theirs) = UnixStream::pair().unwrap();
        events_theirs.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        rt.bus().add_channel(ChannelKind::Connect, "test", events_ours);

        let (host, mut extension) = UnixStream::pair().unwrap();
        extension.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let _link = attach_extension(&rt, host).unwrap();

        assert_eq!(read_message(&mut extension).unwrap(), ExtMessage::Hello(1));
        write_message(&mut extension, &ExtMessage::Focus("input#q".into())).unwrap();
        write_message(&mut extension, &ExtMessage::Blur("input#q".into())).unwrap();

        let mut events = BufReader::new(events_theirs);
        let mut line = String::new();
        events.read_line(&mut line).unwrap();
        assert_eq!(line, "EVENT [x] FOCUS_ELEMENT 'input#q'\n");
        line.clear();
        events.read_line(&mut line).unwrap();
        assert_eq!(line, "EVENT [x] BLUR_ELEMENT 'input#q'\n");
    }

    #[test]
    fn test_protocol_error_closes_link() {
        let rt = Runtime::builder().name("x").expander(Verbatim).build();
        let (host, mut extension) = UnixStream::pair().unwrap();
        extension.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
        let _link = attach_extension(&rt, host).unwrap();
        assert_eq!(read_message(&mut extension).unwrap(), ExtMessage::Hello(1));

        // unknown message type
        let mut bad = 42i32.to_ne_bytes().to_vec();
        bad.extend_from_slice(&0i32.to_ne_bytes());
        std::io::Write::write_all(&mut extension, &bad).unwrap();

        let mut rest = Vec::new();
        extension.read_to_end(&mut rest).unwrap();
        assert!(rest.is_empty());
    }
}
