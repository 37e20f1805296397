//! Event formatting
//!
//! An event renders to a single line:
//!
//! ```text
//! EVENT [<instance>] <NAME> <field> <field> ...\n
//! ```
//!
//! Field encoding depends on the declared type, see [`Field`]. A line that
//! would carry a raw newline is never produced; [`Event::format`] returns
//! `None` instead and the event is dropped.

pub mod bus;

pub use bus::{ChannelId, ChannelKind, EventBus, CHANNEL_QUEUE_LIMIT, DEFAULT_BUFFER_TIMEOUT};

use crate::variables::is_valid_name;
use std::fmt::Write as _;

macro_rules! event_kinds {
    ($($variant:ident => $name:literal,)*) => {
        /// Well-known event names, in wire order
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum EventKind {
            $($variant,)*
        }

        impl EventKind {
            /// Every kind in declaration order
            pub const ALL: &'static [EventKind] = &[$(EventKind::$variant,)*];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(EventKind::$variant => $name,)*
                }
            }

            pub fn from_name(name: &str) -> Option<EventKind> {
                match name {
                    $($name => Some(EventKind::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

event_kinds! {
    LoadStart => "LOAD_START",
    LoadRedirected => "LOAD_REDIRECTED",
    LoadCommit => "LOAD_COMMIT",
    LoadFinish => "LOAD_FINISH",
    LoadError => "LOAD_ERROR",
    RequestQueued => "REQUEST_QUEUED",
    RequestStarting => "REQUEST_STARTING",
    RequestFinished => "REQUEST_FINISHED",
    KeyPress => "KEY_PRESS",
    KeyRelease => "KEY_RELEASE",
    ModPress => "MOD_PRESS",
    ModRelease => "MOD_RELEASE",
    CommandExecuted => "COMMAND_EXECUTED",
    LinkHover => "LINK_HOVER",
    TitleChanged => "TITLE_CHANGED",
    GeometryChanged => "GEOMETRY_CHANGED",
    WebInspector => "WEBINSPECTOR",
    NewWindow => "NEW_WINDOW",
    CloseWindow => "CLOSE_WINDOW",
    VariableSet => "VARIABLE_SET",
    FifoSet => "FIFO_SET",
    SocketSet => "SOCKET_SET",
    InstanceStart => "INSTANCE_START",
    InstanceExit => "INSTANCE_EXIT",
    LoadProgress => "LOAD_PROGRESS",
    LinkUnhover => "LINK_UNHOVER",
    FormActive => "FORM_ACTIVE",
    RootActive => "ROOT_ACTIVE",
    FocusLost => "FOCUS_LOST",
    FocusGained => "FOCUS_GAINED",
    FileIncluded => "FILE_INCLUDED",
    PlugCreated => "PLUG_CREATED",
    CommandError => "COMMAND_ERROR",
    Builtins => "BUILTINS",
    ScrollVert => "SCROLL_VERT",
    ScrollHoriz => "SCROLL_HORIZ",
    DownloadStarted => "DOWNLOAD_STARTED",
    DownloadProgress => "DOWNLOAD_PROGRESS",
    DownloadError => "DOWNLOAD_ERROR",
    DownloadComplete => "DOWNLOAD_COMPLETE",
    AddCookie => "ADD_COOKIE",
    DeleteCookie => "DELETE_COOKIE",
    FocusElement => "FOCUS_ELEMENT",
    BlurElement => "BLUR_ELEMENT",
    WebProcessCrashed => "WEB_PROCESS_CRASHED",
    UserEvent => "USER_EVENT",
    InsecureContent => "INSECURE_CONTENT",
    WebProcessStarted => "WEB_PROCESS_STARTED",
}

/// Event name: a well-known kind or a free-text custom name
#[derive(Debug, Clone, PartialEq)]
pub enum EventName {
    Known(EventKind),
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Known(kind) => kind.as_str(),
            EventName::Custom(name) => name,
        }
    }
}

/// A typed event field
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    /// Decimal integer
    Int(i64),
    /// Single-quoted, with `\`, `'` and newline escaped
    Str(String),
    /// Appended as given; the caller did the escaping
    Formatted(String),
    /// Bare identifier, must pass the variable name check
    Name(String),
    /// Each element quoted like [`Field::Str`], space separated
    StrArray(Vec<String>),
    /// Fixed two decimals
    Float(f64),
}

/// Quote a string for an event line
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('\'');
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            c => out.push(c),
        }
    }
    out.push('\'');
    out
}

impl Field {
    /// Append the encoded field to `out`, or `None` if the field is unusable
    fn encode(&self, out: &mut String) -> Option<()> {
        match self {
            Field::Int(i) => {
                let _ = write!(out, "{}", i);
            }
            Field::Str(s) => out.push_str(&escape(s)),
            Field::Formatted(s) => out.push_str(s),
            Field::Name(name) => {
                if !is_valid_name(name) {
                    tracing::error!(event = "invalid_event_name_field", name = %name);
                    return None;
                }
                out.push_str(name);
            }
            Field::StrArray(items) => {
                let quoted: Vec<String> = items.iter().map(|item| escape(item)).collect();
                out.push_str(&quoted.join(" "));
            }
            Field::Float(f) => {
                let _ = write!(out, "{:.2}", f);
            }
        }
        Some(())
    }
}

/// Encode `fields` separated by single spaces
pub fn format_fields(fields: &[Field]) -> Option<String> {
    let mut out = String::new();
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        field.encode(&mut out)?;
    }
    Some(out)
}

/// One event, built up field by field
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: EventName,
    pub fields: Vec<Field>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            name: EventName::Known(kind),
            fields: Vec::new(),
        }
    }

    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: EventName::Custom(name.into()),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn int(self, value: i64) -> Self {
        self.field(Field::Int(value))
    }

    pub fn str(self, value: impl Into<String>) -> Self {
        self.field(Field::Str(value.into()))
    }

    /// Render the wire line for `instance`, including the trailing newline
    pub fn format(&self, instance: &str) -> Option<String> {
        let mut line = format!("EVENT [{}] {}", instance, self.name.as_str());
        if !self.fields.is_empty() {
            line.push(' ');
            line.push_str(&format_fields(&self.fields)?);
        }

        if line.contains('\n') || line.contains('\r') {
            tracing::debug!(event = "event_dropped", name = %self.name.as_str(), "embedded newline");
            return None;
        }

        line.push('\n');
        Some(line)
    }
}
