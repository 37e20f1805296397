//! Built-in variable table

use super::{Access, Value, Variables};

/// Side effect run after a built-in slot is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    /// Navigate the renderer to the new `uri`
    LoadUri,
    /// Push `zoom_level` to the renderer
    Zoom,
    /// Pass `useragent` to the renderer
    UserAgent,
    /// (Re)create the control fifo in the new directory
    FifoDir,
    /// (Re)create the control socket in the new directory
    SocketDir,
    /// (Re)create the extension socket in the new directory
    ExtensionDir,
    /// Attach or detach the stdout event channel
    PrintEvents,
    /// Point the cookie client at a new daemon socket
    CookieSocket,
}

/// Register the built-in slots for an instance called `name`
pub fn register_builtins(vars: &Variables, name: &str, pid: u32, cookie_socket: &str) {
    let rw = Access::READ_WRITE;
    let ro = Access::READ_ONLY;

    vars.register("verbose", Value::Int(0), rw, None);
    vars.register("print_events", Value::Int(0), rw, Some(Hook::PrintEvents));
    vars.register("uri", Value::Str(String::new()), rw, Some(Hook::LoadUri));
    vars.register("useragent", Value::Str(default_user_agent()), rw, Some(Hook::UserAgent));
    vars.register("fifo_dir", Value::Str(String::new()), rw, Some(Hook::FifoDir));
    vars.register("socket_dir", Value::Str(String::new()), rw, Some(Hook::SocketDir));
    vars.register("extension_dir", Value::Str(String::new()), rw, Some(Hook::ExtensionDir));
    vars.register("shell_cmd", Value::Str(String::new()), rw, None);
    vars.register("zoom_level", Value::Float(1.0), rw, Some(Hook::Zoom));
    vars.register("zoom_step", Value::Float(0.1), rw, None);
    vars.register("forward_keys", Value::Int(0), rw, None);
    vars.register("frozen", Value::Int(0), rw, None);
    vars.register(
        "cookie_daemon_socket",
        Value::Str(cookie_socket.to_string()),
        rw,
        Some(Hook::CookieSocket),
    );

    vars.register("NAME", Value::Str(name.to_string()), ro, None);
    vars.register("PID", Value::Int(i64::from(pid)), ro, None);
    vars.register("fifo_path", Value::Str(String::new()), ro, None);
    vars.register("socket_path", Value::Str(String::new()), ro, None);
    vars.register("extension_path", Value::Str(String::new()), ro, None);
    vars.register("last_result", Value::Str(String::new()), Access::HIDDEN, None);
}

fn default_user_agent() -> String {
    format!("webctl/{}", env!("CARGO_PKG_VERSION"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::Kind;

    #[test]
    fn test_builtin_kinds() {
        let vars = Variables::new();
        register_builtins(&vars, "main", 42, "/tmp/cookies");

        assert_eq!(vars.kind("zoom_level"), Some(Kind::Float));
        assert_eq!(vars.kind("print_events"), Some(Kind::Int));
        assert_eq!(vars.get("NAME").as_deref(), Some("main"));
        assert_eq!(vars.get("PID").as_deref(), Some("42"));
        assert_eq!(vars.get("cookie_daemon_socket").as_deref(), Some("/tmp/cookies"));
    }

    #[test]
    fn test_constants_are_read_only() {
        let vars = Variables::new();
        register_builtins(&vars, "main", 42, "");
        assert!(vars.set("NAME", "other").is_err());
        assert!(vars.set("last_result", "x").is_err());
        assert!(vars.set("uri", "http://example.com").is_ok());
    }

    #[test]
    fn test_last_result_not_dumped() {
        let vars = Variables::new();
        register_builtins(&vars, "main", 1, "");
        assert!(vars.dump().iter().all(|entry| entry.name != "last_result"));
        assert!(vars.dump().iter().any(|entry| entry.name == "PID" && !entry.writeable));
    }

    #[test]
    fn test_hooks_attached() {
        let vars = Variables::new();
        register_builtins(&vars, "main", 1, "");
        let assigned = vars.set("zoom_level", "2").unwrap();
        assert_eq!(assigned.hook, Some(Hook::Zoom));
        let assigned = vars.set("shell_cmd", "sh -c").unwrap();
        assert_eq!(assigned.hook, None);
    }
}
