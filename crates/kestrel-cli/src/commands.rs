use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use kestrel_engine::{EngineConfig, EngineRegistry, Object, ObjectEngine};
use kestrel_types::{
    partition_of, Metadata, ObjectVars, Timestamp, CONTENT_LENGTH, X_TIMESTAMP,
};
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let engine = || EngineRegistry::with_defaults().build(&config);
    match cli.command {
        Command::Put(args) => cmd_put(engine()?, args),
        Command::Get(args) => cmd_get(engine()?, args),
        Command::Head(args) => cmd_head(engine()?, args),
        Command::Post(args) => cmd_post(engine()?, args),
        Command::Delete(args) => cmd_delete(engine()?, args),
        Command::List(args) => cmd_list(engine()?, args),
        Command::Reclaim => cmd_reclaim(engine()?),
        Command::Partition(args) => cmd_partition(&config, args),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<EngineConfig> {
    match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading configuration from {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn vars(target: &ObjectArgs) -> ObjectVars {
    ObjectVars::new(
        &target.device,
        &target.account,
        &target.container,
        &target.object,
    )
}

/// Run `f` against a fresh handle and close the handle whatever happens.
fn with_object<T>(
    engine: &dyn ObjectEngine,
    target: &ObjectArgs,
    need_data: bool,
    f: impl FnOnce(&mut dyn Object) -> anyhow::Result<T>,
) -> anyhow::Result<T> {
    let mut obj = engine.new_object(&vars(target), need_data, None)?;
    debug!(object = %obj.repr(), "opened handle");
    let result = f(obj.as_mut());
    let closed = obj.close();
    let value = result?;
    closed?;
    Ok(value)
}

fn cmd_put(engine: Arc<dyn ObjectEngine>, args: PutArgs) -> anyhow::Result<()> {
    let mut src = File::open(&args.file)
        .with_context(|| format!("opening {}", args.file.display()))?;
    let size = src.metadata()?.len();
    let timestamp = resolve_timestamp(args.timestamp.as_deref())?;

    with_object(engine.as_ref(), &args.target, true, |obj| {
        let written = io::copy(&mut src, obj.set_data(size as i64)?)?;
        let metadata = Metadata::from([
            (X_TIMESTAMP.to_string(), timestamp.clone()),
            (CONTENT_LENGTH.to_string(), written.to_string()),
        ]);
        obj.commit(&metadata)?;
        println!(
            "{} Stored {} ({} bytes, {})",
            "✓".green().bold(),
            args.target.object.bold(),
            written,
            timestamp.cyan()
        );
        Ok(())
    })
}

fn cmd_get(engine: Arc<dyn ObjectEngine>, args: GetArgs) -> anyhow::Result<()> {
    let range = args.range.as_deref().map(parse_range).transpose()?;
    with_object(engine.as_ref(), &args.target, true, |obj| {
        if !obj.try_exists()? {
            bail!("{} is deleted", args.target.object);
        }
        let stdout = io::stdout();
        let mut out = stdout.lock();
        match range {
            Some((start, end)) => obj.copy_range(&mut out, start, end)?,
            None => obj.copy(&mut [&mut out])?,
        };
        out.flush()?;
        Ok(())
    })
}

fn cmd_head(engine: Arc<dyn ObjectEngine>, args: ObjectArgs) -> anyhow::Result<()> {
    with_object(engine.as_ref(), &args, false, |obj| {
        let metadata = obj.try_metadata()?.clone();
        println!("{}", serde_json::to_string_pretty(&metadata)?);
        let exists = if obj.exists() { "yes".green() } else { "no (tombstone)".red() };
        println!("Exists: {exists}");
        println!("Content-Length: {}", obj.content_length());
        Ok(())
    })
}

fn cmd_post(engine: Arc<dyn ObjectEngine>, args: PostArgs) -> anyhow::Result<()> {
    let updates = args
        .pairs
        .iter()
        .map(|p| parse_pair(p))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let timestamp = resolve_timestamp(args.timestamp.as_deref())?;
    with_object(engine.as_ref(), &args.target, false, |obj| {
        let mut metadata = obj.try_metadata()?.clone();
        metadata.extend(updates);
        metadata.insert(X_TIMESTAMP.to_string(), timestamp);
        obj.commit_metadata(&metadata)?;
        println!("{} Updated metadata of {}", "✓".green(), args.target.object.bold());
        Ok(())
    })
}

fn cmd_delete(engine: Arc<dyn ObjectEngine>, args: DeleteArgs) -> anyhow::Result<()> {
    let timestamp = resolve_timestamp(args.timestamp.as_deref())?;
    with_object(engine.as_ref(), &args.target, false, |obj| {
        obj.delete(&Metadata::from([(X_TIMESTAMP.to_string(), timestamp.clone())]))?;
        println!("{} Deleted {} at {}", "✓".green(), args.target.object.bold(), timestamp.cyan());
        Ok(())
    })
}

fn cmd_list(engine: Arc<dyn ObjectEngine>, args: ObjectArgs) -> anyhow::Result<()> {
    let mut listing = engine.partition_listing(&vars(&args), None)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    listing.copy(&mut [&mut out])?;
    out.flush()?;
    Ok(())
}

fn cmd_reclaim(engine: Arc<dyn ObjectEngine>) -> anyhow::Result<()> {
    let removed = engine.reclaim()?;
    println!("{} Reclaim: {} tombstones removed.", "✓".green(), removed);
    Ok(())
}

fn cmd_partition(config: &EngineConfig, args: PartitionArgs) -> anyhow::Result<()> {
    let power = config.ring_part_power();
    let partition = partition_of(&args.hash, power)?;
    println!("{partition}");
    Ok(())
}

/// Canonical form of `raw`, or of the current time when absent.
fn resolve_timestamp(raw: Option<&str>) -> anyhow::Result<String> {
    let ts = match raw {
        Some(s) => Timestamp::parse(s)?,
        None => Timestamp::now(),
    };
    Ok(ts.canonical())
}

/// Parse `START-END` into an end-exclusive byte range.
fn parse_range(s: &str) -> anyhow::Result<(u64, u64)> {
    let (start, end) = s
        .split_once('-')
        .with_context(|| format!("range {s:?} is not START-END"))?;
    let start: u64 = start.trim().parse().with_context(|| format!("bad range start in {s:?}"))?;
    let end: u64 = end.trim().parse().with_context(|| format!("bad range end in {s:?}"))?;
    if end < start {
        bail!("range {s:?} ends before it starts");
    }
    Ok((start, end))
}

fn parse_pair(s: &str) -> anyhow::Result<(String, String)> {
    match s.split_once('=') {
        Some((k, v)) if !k.is_empty() => Ok((k.to_string(), v.to_string())),
        _ => bail!("metadata entry {s:?} is not KEY=VALUE"),
    }
}
