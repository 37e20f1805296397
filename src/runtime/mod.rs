//! The running instance
//!
//! [`Runtime`] owns the variable registry, the command table, the event bus,
//! the request slot and the control endpoints, and holds the injected
//! collaborators (renderer, spawner, expander). Channel threads share it
//! through an `Arc`; every piece of mutable state inside carries its own
//! lock.

pub mod host;

pub use host::{Axis, HeadlessRenderer, ProcessSpawner, Renderer, Spawner};

use crate::builtins::{Commands, Invocation};
use crate::daemon::client::CookieClient;
use crate::error::CommandError;
use crate::events::{ChannelKind, Event, EventBus, EventKind, Field, DEFAULT_BUFFER_TIMEOUT};
use crate::expand::{Expand, ExpandHost, Expander, ScriptContext};
use crate::ipc::{self, Endpoints};
use crate::lexer;
use crate::request::Requests;
use crate::variables::{register_builtins, Assignment, Hook, Value, Variables};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};
use std::time::Duration;

/// Builder for [`Runtime`]
pub struct RuntimeBuilder {
    name: Option<String>,
    renderer: Box<dyn Renderer>,
    spawner: Box<dyn Spawner>,
    expander: Box<dyn Expand>,
    buffer_timeout: Duration,
    cookie_socket: Option<PathBuf>,
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self {
            name: None,
            renderer: Box::new(HeadlessRenderer),
            spawner: Box::new(ProcessSpawner),
            expander: Box::new(Expander),
            buffer_timeout: DEFAULT_BUFFER_TIMEOUT,
            cookie_socket: None,
        }
    }
}

impl RuntimeBuilder {
    /// Instance name used in event lines and endpoint paths (default: pid)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    pub fn expander(mut self, expander: impl Expand + 'static) -> Self {
        self.expander = Box::new(expander);
        self
    }

    pub fn buffer_timeout(mut self, timeout: Duration) -> Self {
        self.buffer_timeout = timeout;
        self
    }

    pub fn cookie_socket(mut self, path: impl Into<PathBuf>) -> Self {
        self.cookie_socket = Some(path.into());
        self
    }

    pub fn build(self) -> Arc<Runtime> {
        let pid = std::process::id();
        let name = self.name.unwrap_or_else(|| pid.to_string());

        let variables = Variables::new();
        let cookie_socket = self
            .cookie_socket
            .as_deref()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        register_builtins(&variables, &name, pid, &cookie_socket);

        let cookies = CookieClient::new(self.cookie_socket);
        let bus = EventBus::with_buffer_timeout(name.clone(), self.buffer_timeout);

        Arc::new_cyclic(|this| Runtime {
            name,
            pid,
            variables,
            commands: Commands::new(),
            bus,
            requests: Requests::new(),
            renderer: self.renderer,
            spawner: self.spawner,
            expander: self.expander,
            cookies: Mutex::new(cookies),
            endpoints: Mutex::new(Endpoints::default()),
            exit: Mutex::new(None),
            exit_signal: Condvar::new(),
            this: this.clone(),
        })
    }
}

/// A running instance
pub struct Runtime {
    name: String,
    pid: u32,
    variables: Variables,
    commands: Commands,
    bus: EventBus,
    requests: Requests,
    renderer: Box<dyn Renderer>,
    spawner: Box<dyn Spawner>,
    expander: Box<dyn Expand>,
    cookies: Mutex<CookieClient>,
    endpoints: Mutex<Endpoints>,
    exit: Mutex<Option<i32>>,
    exit_signal: Condvar,
    this: Weak<Runtime>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn commands(&self) -> &Commands {
        &self.commands
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn requests(&self) -> &Requests {
        &self.requests
    }

    pub fn renderer(&self) -> &dyn Renderer {
        self.renderer.as_ref()
    }

    pub fn spawner(&self) -> &dyn Spawner {
        self.spawner.as_ref()
    }

    /// Shared handle to this runtime, for work that outlives the current call
    pub fn handle(&self) -> Option<Arc<Runtime>> {
        self.this.upgrade()
    }

    pub(crate) fn endpoints(&self) -> MutexGuard<'_, Endpoints> {
        self.endpoints.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn cookies(&self) -> MutexGuard<'_, CookieClient> {
        self.cookies.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn send_event(&self, event: &Event) -> bool {
        self.bus.send(event)
    }

    /// Announce the instance: `INSTANCE_START` and the command list
    pub fn start(&self) {
        self.send_event(&Event::new(EventKind::InstanceStart).int(i64::from(self.pid)));
        self.send_event(
            &Event::new(EventKind::Builtins).field(Field::StrArray(self.commands.names())),
        );
    }

    // Variables

    /// Formatted value of `name`, empty when unknown
    pub fn variable(&self, name: &str) -> String {
        self.variables.get(name).unwrap_or_default()
    }

    /// Write a variable, emit `VARIABLE_SET` and run its hook.
    ///
    /// Rejected writes are logged at debug level and return false.
    pub fn set_variable(&self, name: &str, value: &str) -> bool {
        match self.variables.set(name, value) {
            Ok(assigned) => {
                self.after_assignment(&assigned);
                true
            }
            Err(e) => {
                tracing::debug!(event = "variable_rejected", error = %e);
                false
            }
        }
    }

    /// Toggle a variable through `ring`, see [`Variables::toggle`]
    pub fn toggle_variable(&self, name: &str, ring: &[String]) -> bool {
        match self.variables.toggle(name, ring) {
            Ok(assigned) => {
                self.after_assignment(&assigned);
                true
            }
            Err(e) => {
                tracing::debug!(event = "variable_rejected", error = %e);
                false
            }
        }
    }

    fn after_assignment(&self, assigned: &Assignment) {
        self.send_event(&assigned.event());
        if let Some(hook) = assigned.hook {
            self.run_hook(hook, &assigned.value);
        }
    }

    fn run_hook(&self, hook: Hook, value: &Value) {
        match hook {
            Hook::LoadUri => {
                let uri = value.to_string();
                if !uri.is_empty() {
                    self.renderer.load_uri(&uri);
                }
            }
            Hook::Zoom => self.renderer.set_zoom(value.as_float()),
            Hook::UserAgent => self.renderer.set_user_agent(&value.to_string()),
            Hook::FifoDir => self.with_handle(|rt| {
                if let Err(e) = ipc::attach_fifo(rt, Path::new(&value.to_string())) {
                    tracing::warn!(event = "fifo_attach_failed", error = %e);
                }
            }),
            Hook::SocketDir => self.with_handle(|rt| {
                if let Err(e) = ipc::attach_socket(rt, Path::new(&value.to_string())) {
                    tracing::warn!(event = "socket_attach_failed", error = %e);
                }
            }),
            Hook::ExtensionDir => self.with_handle(|rt| {
                if let Err(e) = ipc::attach_extension_socket(rt, Path::new(&value.to_string())) {
                    tracing::warn!(event = "extension_attach_failed", error = %e);
                }
            }),
            Hook::PrintEvents => {
                if value.is_truthy() {
                    if self.bus.count_kind(ChannelKind::Stdout) == 0 {
                        self.bus.add_channel(ChannelKind::Stdout, "stdout", io::stdout());
                    }
                } else {
                    self.bus.remove_kind(ChannelKind::Stdout);
                }
            }
            Hook::CookieSocket => {
                let path = value.to_string();
                let path = (!path.is_empty()).then(|| PathBuf::from(path));
                self.cookies().set_socket_path(path);
            }
        }
    }

    fn with_handle(&self, f: impl FnOnce(&Arc<Runtime>)) {
        if let Some(rt) = self.handle() {
            f(&rt);
        }
    }

    // Commands

    /// Expand and parse `line`.
    ///
    /// Unknown commands emit `COMMAND_ERROR` with the expanded line and parse
    /// to `None`, as do empty lines.
    pub fn parse(&self, line: &str) -> Option<Invocation> {
        let expanded = self.expander.expand(line, self);
        match self.commands.parse(&expanded) {
            Ok(invocation) => invocation,
            Err(CommandError::Unknown { name, line }) => {
                tracing::debug!(event = "unknown_command", command = %name);
                self.send_event(&Event::new(EventKind::CommandError).str(line));
                None
            }
        }
    }

    /// Run a parsed command and return its result (empty when it has none).
    ///
    /// `COMMAND_EXECUTED` is rendered from the arguments before the handler
    /// runs and broadcast after it returns. A non-empty result is kept in
    /// `last_result`. Handler errors become `COMMAND_ERROR` events.
    pub fn run(&self, invocation: Invocation) -> String {
        let Invocation { command, mut args } = invocation;

        let notice = if command.notify {
            Event::new(EventKind::CommandExecuted)
                .field(Field::Name(command.name.to_string()))
                .field(Field::StrArray(args.clone()))
                .format(&self.name)
        } else {
            None
        };

        let result = match (command.handler)(self, &mut args) {
            Ok(Some(result)) => {
                self.variables.store("last_result", Value::Str(result.clone()));
                result
            }
            Ok(None) => String::new(),
            Err(e) => {
                tracing::debug!(event = "command_failed", command = command.name, error = %e);
                self.send_event(&Event::new(EventKind::CommandError).str(e.to_string()));
                String::new()
            }
        };

        if let Some(line) = notice {
            self.bus.broadcast(&line);
        }
        result
    }

    /// Expand, parse and run one control line
    pub fn execute(&self, line: &str) -> String {
        match self.parse(line) {
            Some(invocation) => self.run(invocation),
            None => String::new(),
        }
    }

    /// Run every line of a script, skipping blank lines and `#` comments
    pub fn execute_script(&self, text: &str) {
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.execute(line);
        }
    }

    // Processes

    /// Environment handed to spawned handlers
    pub fn process_env(&self) -> Vec<(String, String)> {
        vec![
            ("WEBCTL_NAME".to_string(), self.name.clone()),
            ("WEBCTL_PID".to_string(), self.pid.to_string()),
            ("WEBCTL_FIFO".to_string(), self.variable("fifo_path")),
            ("WEBCTL_SOCKET".to_string(), self.variable("socket_path")),
            ("WEBCTL_URI".to_string(), self.variable("uri")),
        ]
    }

    /// `shell_cmd` split into argv, followed by `args`
    pub fn shell_argv(&self, args: &[String]) -> Vec<String> {
        let shell = self.variable("shell_cmd");
        let mut argv: Vec<String> = lexer::split(&shell, true)
            .into_iter()
            .filter(|token| !token.is_empty())
            .collect();
        if argv.is_empty() {
            argv = vec!["/bin/sh".to_string(), "-c".to_string()];
        }
        argv.extend(args.iter().cloned());
        argv
    }

    // Requests and cookies

    /// Ask the connect peers a question and wait up to `timeout` for the answer
    pub fn request(&self, timeout: Duration, name: &str, fields: &[Field]) -> String {
        self.requests.send(&self.bus, timeout, name, fields)
    }

    /// Cookie header for a URL, from the cookie daemon
    pub fn cookie_get(&self, scheme: &str, host: &str, path: &str) -> String {
        self.cookies().get(scheme, host, path)
    }

    /// Store a `name=value` cookie through the cookie daemon
    pub fn cookie_put(&self, scheme: &str, domain: &str, path: &str, cookie: &str) -> bool {
        self.cookies().put(scheme, domain, path, cookie)
    }

    // Lifecycle

    /// Ask the instance to shut down with `code`. The first request wins.
    pub fn request_exit(&self, code: i32) {
        let mut exit = self.exit.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if exit.is_none() {
            *exit = Some(code);
        }
        self.exit_signal.notify_all();
    }

    /// Fatal failure of an essential channel
    pub fn abort(&self, reason: &str) {
        tracing::error!(event = "fatal", reason = %reason);
        self.request_exit(1);
    }

    pub fn exit_requested(&self) -> Option<i32> {
        *self.exit.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Block until [`Runtime::request_exit`] is called; returns the exit code
    pub fn wait_for_exit(&self) -> i32 {
        let mut exit = self.exit.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        loop {
            if let Some(code) = *exit {
                return code;
            }
            exit = self
                .exit_signal
                .wait(exit)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Emit `INSTANCE_EXIT`, remove the fifo and socket files and flush
    /// every channel
    pub fn shutdown(&self) {
        self.send_event(&Event::new(EventKind::InstanceExit).int(i64::from(self.pid)));
        self.endpoints().close_all();
        self.bus.close();
    }
}

impl ExpandHost for Runtime {
    fn variable(&self, name: &str) -> Option<String> {
        self.variables.get(name)
    }

    fn shell(&self, command: &str, direct: bool) -> String {
        let argv = if direct {
            lexer::split(command, true)
                .into_iter()
                .filter(|token| !token.is_empty())
                .collect()
        } else {
            self.shell_argv(&[command.to_string()])
        };

        match self.spawner.spawn_sync(&argv, &self.process_env()) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(event = "expansion_spawn_failed", error = %e);
                String::new()
            }
        }
    }

    fn script(&self, context: ScriptContext, source: &str) -> String {
        self.renderer.evaluate(context, source)
    }

    fn command(&self, line: &str) -> String {
        self.execute(line)
    }
}
