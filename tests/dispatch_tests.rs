use std::io::{BufRead, BufReader};
use std::os::unix::net::UnixStream;
use std::sync::Arc;
use std::time::Duration;
use webctl::events::ChannelKind;
use webctl::runtime::Runtime;

fn runtime() -> Arc<Runtime> {
    Runtime::builder().name("test").build()
}

/// Attach a connect channel and return the peer side for reading events
fn events(rt: &Runtime) -> BufReader<UnixStream> {
    let (ours, theirs) = UnixStream::pair().unwrap();
    theirs.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    rt.bus().add_channel(ChannelKind::Connect, "test", ours);
    BufReader::new(theirs)
}

fn next_line(reader: &mut BufReader<UnixStream>) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).unwrap();
    line
}

#[test]
fn test_chain_concatenates_results() {
    let rt = runtime();
    assert_eq!(rt.execute("chain 'print foo' 'print bar'"), "foobar");
}

#[test]
fn test_set_then_expand() {
    let rt = runtime();
    rt.execute("set greeting = hello world");
    assert_eq!(rt.variable("greeting"), "hello world");
    assert_eq!(rt.execute("print @greeting!"), "hello world!");
    assert_eq!(rt.execute("print @{greeting}s"), "hello worlds");
    // print takes its argument whole, so the escape stays
    assert_eq!(rt.execute("print \\@greeting"), "\\@greeting");
}

#[test]
fn test_set_emits_variable_set() {
    let rt = runtime();
    let mut events = events(&rt);
    rt.execute("set zoom_level = 2");
    assert_eq!(next_line(&mut events), "EVENT [test] VARIABLE_SET zoom_level double '2'\n");
}

#[test]
fn test_command_executed_follows_command_events() {
    let rt = runtime();
    let mut events = events(&rt);
    rt.execute("toggle flag");
    assert_eq!(next_line(&mut events), "EVENT [test] VARIABLE_SET flag str '1'\n");
    assert_eq!(next_line(&mut events), "EVENT [test] COMMAND_EXECUTED toggle 'flag'\n");
}

#[test]
fn test_unknown_command_reports_expanded_line() {
    let rt = runtime();
    let mut events = events(&rt);
    rt.execute("set who = me");
    next_line(&mut events);
    assert_eq!(rt.execute("frob @who"), "");
    assert_eq!(next_line(&mut events), "EVENT [test] COMMAND_ERROR 'frob me'\n");
}

#[test]
fn test_custom_event() {
    let rt = runtime();
    let mut events = events(&rt);
    rt.execute("event my_thing some details");
    assert_eq!(next_line(&mut events), "EVENT [test] MY_THING some details\n");
}

#[test]
fn test_dump_config_lines() {
    let rt = runtime();
    let dump = rt.execute("dump_config");
    assert!(dump.lines().any(|l| l == "set zoom_step = 0.1"));
    assert!(dump.lines().any(|l| l == "# set NAME = test"));
    assert!(!dump.lines().any(|l| l.contains("last_result")));
}

#[test]
fn test_include_runs_file_and_reports() {
    let rt = runtime();
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("conf");
    std::fs::write(&script, "# comment\n\nset from_file = 1\n  set second = two  \n").unwrap();

    let mut events = events(&rt);
    rt.execute(&format!("include {}", script.display()));
    assert_eq!(rt.variable("from_file"), "1");
    assert_eq!(rt.variable("second"), "two");

    next_line(&mut events);
    next_line(&mut events);
    assert_eq!(
        next_line(&mut events),
        format!("EVENT [test] FILE_INCLUDED '{}'\n", script.display())
    );
}

#[test]
fn test_sync_sh_result() {
    let rt = runtime();
    assert_eq!(rt.execute("sync_sh 'echo -n out'"), "out");
    assert_eq!(rt.execute("print @(echo shell)@"), "shell");
}

#[test]
fn test_exit_command() {
    let rt = runtime();
    rt.execute("exit");
    assert_eq!(rt.exit_requested(), Some(0));
}
