// Control commands: variables, events, chaining, includes, cookies, exit

use crate::events::{Event, EventKind, Field};
use crate::runtime::Runtime;
use anyhow::{anyhow, Result};
use std::fs;

/// `set <name> = <value>`
///
/// The name is trimmed and the value left-trimmed. Without `=` the value is
/// a single space.
pub fn set(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let arg = match args.first() {
        Some(arg) => arg,
        None => return Ok(None),
    };

    let (name, value) = match arg.split_once('=') {
        Some((name, value)) => (name.trim(), value.trim_start()),
        None => (arg.trim(), " "),
    };
    rt.set_variable(name, value);
    Ok(None)
}

/// `toggle <name> [value...]`
pub fn toggle(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let (name, ring) = args
        .split_first()
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("toggle: missing variable name"))?;
    rt.toggle_variable(name, ring);
    Ok(None)
}

/// Result is the configuration as `set` lines, one per dumpable variable
pub fn dump_config(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    let lines: Vec<String> = rt.variables().dump().iter().map(|entry| entry.line()).collect();
    Ok(Some(lines.join("\n")))
}

pub fn dump_config_as_events(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    for entry in rt.variables().dump() {
        rt.send_event(&entry.event());
    }
    Ok(None)
}

/// `print <text>`: the (already expanded) text is the result
pub fn print(_rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    Ok(Some(args.first().cloned().unwrap_or_default()))
}

/// `event <NAME> [details]`: send a custom event.
///
/// The name is uppercased, the details are sent as given.
pub fn event(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let arg = args.first().map(String::as_str).unwrap_or_default();
    let (name, details) = match arg.split_once(' ') {
        Some((name, details)) => (name, Some(details)),
        None => (arg, None),
    };
    if name.is_empty() {
        return Err(anyhow!("event: missing name"));
    }

    let mut event = Event::custom(name.to_uppercase());
    if let Some(details) = details {
        event = event.field(Field::Formatted(details.to_string()));
    }
    rt.send_event(&event);
    Ok(None)
}

/// `chain <line> <line> ...`: run each argument, concatenating the results
pub fn chain(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let mut result = String::new();
    for line in args.iter() {
        result.push_str(&rt.execute(line));
    }
    Ok(Some(result))
}

/// `include <file>`: run the file as a script, then emit `FILE_INCLUDED`
pub fn include(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let path = args.first().map(|p| p.trim()).unwrap_or_default();
    let text = fs::read_to_string(path)
        .map_err(|_| anyhow!("File {} can not be read.", path))?;

    rt.execute_script(&text);
    rt.send_event(&Event::new(EventKind::FileIncluded).str(path));
    Ok(None)
}

pub fn exit(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    rt.request_exit(0);
    Ok(None)
}

/// `cookie_get <scheme> <host> <path>`
pub fn cookie_get(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    match args.as_slice() {
        [scheme, host, path, ..] => Ok(Some(rt.cookie_get(scheme, host, path))),
        _ => Err(anyhow!("cookie_get: expected scheme, host and path")),
    }
}

/// `cookie_put <scheme> <domain> <path> <name=value>`
pub fn cookie_put(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    match args.as_slice() {
        [scheme, domain, path, cookie, ..] => {
            if rt.cookie_put(scheme, domain, path, cookie) {
                rt.send_event(
                    &Event::new(EventKind::AddCookie)
                        .str(domain.clone())
                        .str(path.clone())
                        .str(cookie.clone()),
                );
            }
            Ok(None)
        }
        _ => Err(anyhow!("cookie_put: expected scheme, domain, path and name=value")),
    }
}
