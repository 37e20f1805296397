// Process commands: spawn, sync_spawn, sync_spawn_exec, sh, sync_sh

use crate::runtime::Runtime;
use anyhow::{anyhow, Result};

fn argv(args: &[String]) -> Result<Vec<String>> {
    match args.first() {
        Some(program) if !program.is_empty() => Ok(args.to_vec()),
        _ => Err(anyhow!("spawn: missing program")),
    }
}

pub fn spawn(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let argv = argv(args)?;
    rt.spawner()
        .spawn(&argv, &rt.process_env())
        .map_err(|e| anyhow!("spawn {}: {}", argv[0], e))?;
    Ok(None)
}

pub fn sync_spawn(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let argv = argv(args)?;
    let output = rt
        .spawner()
        .spawn_sync(&argv, &rt.process_env())
        .map_err(|e| anyhow!("sync_spawn {}: {}", argv[0], e))?;
    Ok(Some(output))
}

/// Run a program and feed every line of its output back in as a command
pub fn sync_spawn_exec(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let output = sync_spawn(rt, args)?.unwrap_or_default();
    for line in output.lines().filter(|line| !line.trim().is_empty()) {
        rt.execute(line);
    }
    Ok(None)
}

fn shell_args(rt: &Runtime, args: &[String]) -> Result<Vec<String>> {
    match args.first() {
        Some(script) if !script.is_empty() => Ok(rt.shell_argv(args)),
        _ => Err(anyhow!("sh: missing command")),
    }
}

pub fn sh(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let mut argv = shell_args(rt, args)?;
    spawn(rt, &mut argv)
}

pub fn sync_sh(rt: &Runtime, args: &mut Vec<String>) -> Result<Option<String>> {
    let mut argv = shell_args(rt, args)?;
    sync_spawn(rt, &mut argv)
}
