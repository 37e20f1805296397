// Renderer-facing commands: history, loading, zoom, scrolling, search, scripts

use crate::events::{Event, EventKind, Field};
use crate::expand::ScriptContext;
use crate::request::DEFAULT_REQUEST_TIMEOUT;
use crate::runtime::{Axis, Runtime};
use anyhow::{anyhow, Result};
use std::fs;

/// History step count from the first argument, default 1
fn steps(args: &[String]) -> u32 {
    args.first()
        .and_then(|arg| arg.trim().parse::<u32>().ok())
        .unwrap_or(1)
}

pub fn back(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().go_back(steps(args));
    Ok(None)
}

pub fn forward(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().go_forward(steps(args));
    Ok(None)
}

pub fn reload(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().reload(false);
    Ok(None)
}

pub fn reload_ign_cache(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().reload(true);
    Ok(None)
}

pub fn stop(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().stop();
    Ok(None)
}

/// `uri <address>`: goes through the `uri` variable so its hook loads the page
pub fn uri(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let target = args.first().map(|s| s.trim()).unwrap_or_default();
    if target.is_empty() {
        return Err(anyhow!("uri: missing address"));
    }
    rt.set_variable("uri", target);
    Ok(None)
}

/// `download <uri> [destination]`
///
/// Without a destination the connect peers are asked with a
/// `DOWNLOAD_REQUEST` request; an empty answer cancels the download.
pub fn download(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let uri = match args.first() {
        Some(uri) if !uri.is_empty() => uri.clone(),
        _ => return Err(anyhow!("download: missing uri")),
    };

    let destination = match args.get(1).filter(|d| !d.is_empty()) {
        Some(destination) => destination.clone(),
        None => rt.request(
            DEFAULT_REQUEST_TIMEOUT,
            "DOWNLOAD_REQUEST",
            &[Field::Str(uri.clone())],
        ),
    };

    if destination.is_empty() {
        rt.send_event(
            &Event::new(EventKind::DownloadError)
                .str(uri)
                .str("no destination"),
        );
        return Ok(None);
    }

    rt.renderer().download(&uri, &destination);
    rt.send_event(&Event::new(EventKind::DownloadStarted).str(destination.clone()));
    Ok(Some(destination))
}

/// `scroll vertical|horizontal <amount>`
pub fn scroll(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let axis = match args.first().map(String::as_str) {
        Some("vertical") => Axis::Vertical,
        Some("horizontal") => Axis::Horizontal,
        other => return Err(anyhow!("scroll: unknown direction {:?}", other.unwrap_or(""))),
    };
    let amount = args
        .get(1)
        .ok_or_else(|| anyhow!("scroll: missing amount"))?;
    rt.renderer().scroll(axis, amount);
    Ok(None)
}

fn zoom_by(rt: &Runtime, direction: f64) {
    let level = rt.variables().value("zoom_level").map_or(1.0, |v| v.as_float());
    let step = rt.variables().value("zoom_step").map_or(0.1, |v| v.as_float());
    rt.set_variable("zoom_level", &(level + direction * step).to_string());
}

pub fn zoom_in(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    zoom_by(rt, 1.0);
    Ok(None)
}

pub fn zoom_out(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    zoom_by(rt, -1.0);
    Ok(None)
}

pub fn search(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let text = args.first().map(String::as_str).unwrap_or_default();
    rt.renderer().search(text, true);
    Ok(None)
}

pub fn search_reverse(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let text = args.first().map(String::as_str).unwrap_or_default();
    rt.renderer().search(text, false);
    Ok(None)
}

pub fn search_clear(rt: &Runtime, _args: &mut Vec<String>) -> Result<Option<String>> {
    rt.renderer().search_clear();
    Ok(None)
}

/// `js <source>`: evaluate in the page, the script value is the result
pub fn js(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let source = args.first().map(String::as_str).unwrap_or_default();
    Ok(Some(rt.renderer().evaluate(ScriptContext::Page, source)))
}

/// `script <file> [arg]`: every `%s` in the file is replaced with `arg`
pub fn script(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let path = args
        .first()
        .filter(|p| !p.is_empty())
        .ok_or_else(|| anyhow!("script: missing file"))?;
    let source = fs::read_to_string(path)
        .map_err(|e| anyhow!("File {} can not be read: {}", path, e))?;

    let source = match args.get(1) {
        Some(arg) => source.replace("%s", arg),
        None => source,
    };
    Ok(Some(rt.renderer().evaluate(ScriptContext::Page, &source)))
}
