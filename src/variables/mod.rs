//! Typed variable registry
//!
//! Every slot has a kind fixed at registration (string, integer or float).
//! Writes convert the incoming text to that kind. Unknown names are created
//! on first write as plain writeable strings, provided the name is valid.
//!
//! The registry only stores values. Emitting `VARIABLE_SET` and running the
//! slot's [`Hook`] is left to the caller, which gets both back in an
//! [`Assignment`] once the registry lock has been released.

mod builtin;

pub use builtin::{register_builtins, Hook};

use crate::error::VariableError;
use crate::events::{Event, EventKind, Field};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};

/// Characters allowed in variable (and event field) names
const NAME_CHARS: &str = "abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_.";

/// Check a name against the identifier rules shared with the expansion grammar.
///
/// Valid names are non-empty, made of ASCII letters, digits, `_` and `.`, and
/// do not start with a digit.
pub fn is_valid_name(name: &str) -> bool {
    match name.chars().next() {
        None => false,
        Some(first) if first.is_ascii_digit() => false,
        Some(_) => name.chars().all(|c| NAME_CHARS.contains(c)),
    }
}

/// Storage kind of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Str,
    Int,
    Float,
}

impl Kind {
    /// Tag used in `VARIABLE_SET` events
    pub fn tag(&self) -> &'static str {
        match self {
            Kind::Str => "str",
            Kind::Int => "int",
            Kind::Float => "double",
        }
    }
}

/// Current value of a slot
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int(i64),
    Float(f64),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Str(_) => Kind::Str,
            Value::Int(_) => Kind::Int,
            Value::Float(_) => Kind::Float,
        }
    }

    /// Convert `text` to a value of `kind`
    pub fn parse(kind: Kind, text: &str) -> Value {
        match kind {
            Kind::Str => Value::Str(text.to_string()),
            Kind::Int => Value::Int(parse_int(text)),
            Kind::Float => Value::Float(parse_float(text)),
        }
    }

    pub fn as_int(&self) -> i64 {
        match self {
            Value::Str(s) => parse_int(s),
            Value::Int(i) => *i,
            Value::Float(f) => *f as i64,
        }
    }

    pub fn as_float(&self) -> f64 {
        match self {
            Value::Str(s) => parse_float(s),
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Str(s) => !s.is_empty() && s != "0",
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(v) => write!(f, "{}", v),
        }
    }
}

/// Length of the leading `[+-]digits` run after optional whitespace
fn numeric_prefix(text: &str, float: bool) -> &str {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut has_digits = end > digits_start;

    if float {
        if end < bytes.len() && bytes[end] == b'.' {
            let frac_start = end + 1;
            let mut frac_end = frac_start;
            while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
                frac_end += 1;
            }
            if has_digits || frac_end > frac_start {
                end = frac_end;
                has_digits = true;
            }
        }
        if has_digits && end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
            let mut exp_end = end + 1;
            if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
                exp_end += 1;
            }
            let exp_digits = exp_end;
            while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
                exp_end += 1;
            }
            if exp_end > exp_digits {
                end = exp_end;
            }
        }
    }

    if has_digits {
        &text[..end]
    } else {
        ""
    }
}

/// Parse the leading integer of `text`; anything non-numeric gives zero.
///
/// `"42abc"` is 42, `"  -7"` is -7, `"abc"` is 0. Out-of-range values saturate.
pub fn parse_int(text: &str) -> i64 {
    let prefix = numeric_prefix(text, false);
    if prefix.is_empty() {
        return 0;
    }
    prefix.parse::<i64>().unwrap_or_else(|_| {
        if prefix.starts_with('-') {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

/// Parse the leading decimal float of `text`; anything non-numeric gives zero.
pub fn parse_float(text: &str) -> f64 {
    numeric_prefix(text, true).parse::<f64>().unwrap_or(0.0)
}

/// Whether the slot accepts writes from commands and whether it shows up in dumps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub writeable: bool,
    pub dumpable: bool,
}

impl Access {
    pub const READ_WRITE: Access = Access { writeable: true, dumpable: true };
    pub const READ_ONLY: Access = Access { writeable: false, dumpable: true };
    pub const HIDDEN: Access = Access { writeable: false, dumpable: false };
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    value: Value,
    access: Access,
    hook: Option<Hook>,
}

/// A successful write, handed back so the caller can notify and run the hook
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: Value,
    pub hook: Option<Hook>,
}

impl Assignment {
    /// `VARIABLE_SET <name> <kind> '<value>'`
    pub fn event(&self) -> Event {
        variable_event(&self.name, &self.value)
    }
}

fn variable_event(name: &str, value: &Value) -> Event {
    Event::new(EventKind::VariableSet)
        .field(Field::Name(name.to_string()))
        .field(Field::Name(value.kind().tag().to_string()))
        .field(Field::Str(value.to_string()))
}

/// One line of a configuration dump
#[derive(Debug, Clone, PartialEq)]
pub struct DumpEntry {
    pub name: String,
    pub value: Value,
    pub writeable: bool,
}

impl DumpEntry {
    /// `set name = value`, commented out for read-only slots
    pub fn line(&self) -> String {
        let prefix = if self.writeable { "" } else { "# " };
        format!("{}set {} = {}", prefix, self.name, self.value)
    }

    pub fn event(&self) -> Event {
        variable_event(&self.name, &self.value)
    }
}

#[derive(Default)]
struct Table {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
}

impl Table {
    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        let idx = *self.index.get(name)?;
        self.slots.get_mut(idx)
    }

    fn insert(&mut self, slot: Slot) {
        match self.index.get(&slot.name) {
            Some(&idx) => self.slots[idx] = slot,
            None => {
                self.index.insert(slot.name.clone(), self.slots.len());
                self.slots.push(slot);
            }
        }
    }

    /// Assign to an existing writeable slot or create a new string slot
    fn assign(&mut self, name: &str, text: &str) -> Result<Assignment, VariableError> {
        if let Some(slot) = self.slot_mut(name) {
            if !slot.access.writeable {
                return Err(VariableError::ReadOnly(name.to_string()));
            }
            slot.value = Value::parse(slot.value.kind(), text);
            return Ok(Assignment {
                name: slot.name.clone(),
                value: slot.value.clone(),
                hook: slot.hook,
            });
        }

        if !is_valid_name(name) {
            return Err(VariableError::InvalidName(name.to_string()));
        }

        let value = Value::Str(text.to_string());
        self.insert(Slot {
            name: name.to_string(),
            value: value.clone(),
            access: Access::READ_WRITE,
            hook: None,
        });
        Ok(Assignment {
            name: name.to_string(),
            value,
            hook: None,
        })
    }
}

/// Pick the ring entry after the one equal to `current`, wrapping to the first
fn next_in_ring<T, F>(ring: &[String], current: &T, parse: F) -> Option<String>
where
    T: PartialEq,
    F: Fn(&str) -> T,
{
    let first = ring.first()?;
    let pos = ring.iter().position(|candidate| parse(candidate) == *current);
    match pos.and_then(|i| ring.get(i + 1)) {
        Some(next) => Some(next.clone()),
        None => Some(first.clone()),
    }
}

/// Registry of typed variables
///
/// All access is serialized through one mutex. Operations are short and never
/// call out while holding it.
#[derive(Default)]
pub struct Variables {
    table: Mutex<Table>,
}

impl Variables {
    /// Empty registry with no built-in slots
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register (or replace) a slot with a fixed kind
    pub fn register(&self, name: &str, value: Value, access: Access, hook: Option<Hook>) {
        self.lock().insert(Slot {
            name: name.to_string(),
            value,
            access,
            hook,
        });
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lock().index.contains_key(name)
    }

    /// Formatted value of `name`, if it exists
    pub fn get(&self, name: &str) -> Option<String> {
        self.value(name).map(|v| v.to_string())
    }

    pub fn value(&self, name: &str) -> Option<Value> {
        let table = self.lock();
        let idx = *table.index.get(name)?;
        Some(table.slots[idx].value.clone())
    }

    pub fn kind(&self, name: &str) -> Option<Kind> {
        self.value(name).map(|v| v.kind())
    }

    /// Write `text` to `name`, converting to the slot's kind.
    ///
    /// Unknown valid names become new writeable string slots. Read-only slots
    /// and invalid names are rejected without touching the table.
    pub fn set(&self, name: &str, text: &str) -> Result<Assignment, VariableError> {
        self.lock().assign(name, text)
    }

    /// Write a value regardless of the writeable flag.
    ///
    /// Used for slots the runtime maintains itself (`last_result`,
    /// `fifo_path`, ...). Missing slots are ignored.
    pub fn store(&self, name: &str, value: Value) {
        if let Some(slot) = self.lock().slot_mut(name) {
            if slot.value.kind() == value.kind() {
                slot.value = value;
            } else {
                slot.value = Value::parse(slot.value.kind(), &value.to_string());
            }
        }
    }

    /// Advance `name` through `ring`, or flip it when the ring is empty.
    ///
    /// With an empty ring integers and floats flip between 0 and 1 and strings
    /// swap `"0"`/`"1"`, any other string becoming empty. With a ring the
    /// value moves to the entry after the current one, wrapping around; a
    /// value not in the ring moves to the first entry. An unknown variable is
    /// created with the first ring entry, or `"1"`.
    pub fn toggle(&self, name: &str, ring: &[String]) -> Result<Assignment, VariableError> {
        let mut table = self.lock();

        let current = match table.index.get(name) {
            Some(&idx) => table.slots[idx].value.clone(),
            None => {
                let initial = ring.first().map(String::as_str).unwrap_or("1");
                return table.assign(name, initial);
            }
        };

        let next = match &current {
            Value::Str(s) => {
                if ring.is_empty() {
                    match s.as_str() {
                        "0" => "1".to_string(),
                        "1" => "0".to_string(),
                        _ => String::new(),
                    }
                } else {
                    next_in_ring(ring, s, |candidate| candidate.to_string()).unwrap_or_default()
                }
            }
            Value::Int(i) => {
                if ring.is_empty() {
                    let flipped = if *i == 0 { "1" } else { "0" };
                    flipped.to_string()
                } else {
                    next_in_ring(ring, i, parse_int).unwrap_or_default()
                }
            }
            Value::Float(f) => {
                if ring.is_empty() {
                    let flipped = if *f == 0.0 { "1" } else { "0" };
                    flipped.to_string()
                } else {
                    next_in_ring(ring, f, parse_float).unwrap_or_default()
                }
            }
        };

        table.assign(name, &next)
    }

    /// Dumpable slots in registration order
    pub fn dump(&self) -> Vec<DumpEntry> {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.access.dumpable)
            .map(|slot| DumpEntry {
                name: slot.name.clone(),
                value: slot.value.clone(),
                writeable: slot.access.writeable,
            })
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().slots.iter().map(|slot| slot.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ring(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_valid_names() {
        assert!(is_valid_name("uri"));
        assert!(is_valid_name("my.var_2"));
        assert!(is_valid_name("_x"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("2fast"));
        assert!(!is_valid_name("has space"));
        assert!(!is_valid_name("at@sign"));
        assert!(!is_valid_name("brace{"));
        assert!(!is_valid_name("quote'"));
    }

    #[test]
    fn test_numeric_prefix_parsing() {
        assert_eq!(parse_int("42"), 42);
        assert_eq!(parse_int("  -7xyz"), -7);
        assert_eq!(parse_int("abc"), 0);
        assert_eq!(parse_int(""), 0);
        assert_eq!(parse_int("+3"), 3);
        assert_eq!(parse_int("99999999999999999999"), i64::MAX);
        assert_eq!(parse_float("1.5"), 1.5);
        assert_eq!(parse_float(".25x"), 0.25);
        assert_eq!(parse_float("2e3"), 2000.0);
        assert_eq!(parse_float("3.e"), 3.0);
        assert_eq!(parse_float("nope"), 0.0);
    }

    #[test]
    fn test_unknown_name_creates_string_slot() {
        let vars = Variables::new();
        let assigned = vars.set("color", "blue").unwrap();
        assert_eq!(assigned.value, Value::Str("blue".into()));
        assert_eq!(assigned.hook, None);
        assert_eq!(vars.get("color").as_deref(), Some("blue"));
        assert_eq!(vars.kind("color"), Some(Kind::Str));
    }

    #[test]
    fn test_invalid_name_rejected() {
        let vars = Variables::new();
        assert_eq!(
            vars.set("bad name", "x"),
            Err(VariableError::InvalidName("bad name".into()))
        );
        assert!(!vars.contains("bad name"));
    }

    #[test]
    fn test_read_only_rejected() {
        let vars = Variables::new();
        vars.register("PID", Value::Int(10), Access::READ_ONLY, None);
        assert!(matches!(vars.set("PID", "5"), Err(VariableError::ReadOnly(_))));
        assert_eq!(vars.get("PID").as_deref(), Some("10"));
    }

    #[test]
    fn test_kind_is_stable() {
        let vars = Variables::new();
        vars.register("level", Value::Int(0), Access::READ_WRITE, None);
        vars.set("level", "12abc").unwrap();
        assert_eq!(vars.value("level"), Some(Value::Int(12)));
        vars.set("level", "junk").unwrap();
        assert_eq!(vars.value("level"), Some(Value::Int(0)));

        vars.set("text", "0").unwrap();
        vars.set("text", "123").unwrap();
        assert_eq!(vars.value("text"), Some(Value::Str("123".into())));
    }

    #[test]
    fn test_store_bypasses_read_only() {
        let vars = Variables::new();
        vars.register("last_result", Value::Str(String::new()), Access::HIDDEN, None);
        vars.store("last_result", Value::Str("done".into()));
        assert_eq!(vars.get("last_result").as_deref(), Some("done"));
    }

    #[test]
    fn test_toggle_ring_wraps() {
        let vars = Variables::new();
        vars.set("mode", "3").unwrap();
        let assigned = vars.toggle("mode", &ring(&["1", "2", "3"])).unwrap();
        assert_eq!(assigned.value, Value::Str("1".into()));
        vars.toggle("mode", &ring(&["1", "2", "3"])).unwrap();
        assert_eq!(vars.get("mode").as_deref(), Some("2"));
    }

    #[test]
    fn test_toggle_value_not_in_ring_goes_to_first() {
        let vars = Variables::new();
        vars.set("mode", "zzz").unwrap();
        vars.toggle("mode", &ring(&["a", "b"])).unwrap();
        assert_eq!(vars.get("mode").as_deref(), Some("a"));
    }

    #[test]
    fn test_toggle_without_ring() {
        let vars = Variables::new();
        vars.register("flag", Value::Int(0), Access::READ_WRITE, None);
        vars.toggle("flag", &[]).unwrap();
        assert_eq!(vars.value("flag"), Some(Value::Int(1)));
        vars.toggle("flag", &[]).unwrap();
        assert_eq!(vars.value("flag"), Some(Value::Int(0)));

        vars.register("zoom", Value::Float(2.5), Access::READ_WRITE, None);
        vars.toggle("zoom", &[]).unwrap();
        assert_eq!(vars.value("zoom"), Some(Value::Float(0.0)));

        vars.set("s", "1").unwrap();
        vars.toggle("s", &[]).unwrap();
        assert_eq!(vars.get("s").as_deref(), Some("0"));
        vars.set("s", "words").unwrap();
        vars.toggle("s", &[]).unwrap();
        assert_eq!(vars.get("s").as_deref(), Some(""));
    }

    #[test]
    fn test_toggle_numeric_ring() {
        let vars = Variables::new();
        vars.register("n", Value::Int(2), Access::READ_WRITE, None);
        vars.toggle("n", &ring(&["1", "2", "3"])).unwrap();
        assert_eq!(vars.value("n"), Some(Value::Int(3)));
        vars.toggle("n", &ring(&["1", "2", "3"])).unwrap();
        assert_eq!(vars.value("n"), Some(Value::Int(1)));
    }

    #[test]
    fn test_toggle_unknown_variable() {
        let vars = Variables::new();
        vars.toggle("fresh", &[]).unwrap();
        assert_eq!(vars.get("fresh").as_deref(), Some("1"));
        vars.toggle("other", &ring(&["x", "y"])).unwrap();
        assert_eq!(vars.get("other").as_deref(), Some("x"));
    }

    #[test]
    fn test_toggle_read_only_fails() {
        let vars = Variables::new();
        vars.register("ro", Value::Int(0), Access::READ_ONLY, None);
        assert!(vars.toggle("ro", &[]).is_err());
    }

    #[test]
    fn test_dump_order_and_visibility() {
        let vars = Variables::new();
        vars.register("b", Value::Int(1), Access::READ_WRITE, None);
        vars.register("a", Value::Str("x".into()), Access::READ_ONLY, None);
        vars.register("hidden", Value::Str("h".into()), Access::HIDDEN, None);
        vars.set("c", "y z").unwrap();

        let lines: Vec<String> = vars.dump().iter().map(DumpEntry::line).collect();
        assert_eq!(lines, vec!["set b = 1", "# set a = x", "set c = y z"]);
    }

    #[test]
    fn test_assignment_event() {
        let vars = Variables::new();
        vars.register("zoom_level", Value::Float(1.0), Access::READ_WRITE, None);
        let assigned = vars.set("zoom_level", "1.5").unwrap();
        let line = assigned.event().format("7").unwrap();
        assert_eq!(line, "EVENT [7] VARIABLE_SET zoom_level double '1.5'\n");
    }
}
