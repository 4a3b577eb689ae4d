//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `lazyrecord_core` linkage.
//! - Run one Thread/Member scenario end to end with stderr logging.
//! - Keep output deterministic for quick local sanity checks.

use lazyrecord_core::{
    default_log_level, init_logging, Field, LogConfig, ModelDef, Schema, Store, StoreResult,
};
use log::error;
use std::process::ExitCode;

fn main() -> ExitCode {
    if let Err(err) = init_logging(&LogConfig::stderr(default_log_level())) {
        eprintln!("logging disabled: {err}");
    }
    println!("lazyrecord_core ping={}", lazyrecord_core::ping());
    println!("lazyrecord_core version={}", lazyrecord_core::core_version());

    match run_scenario() {
        Ok(lines) => {
            for line in lines {
                println!("{line}");
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(
                "event=scenario module=cli status=error code={}",
                err.code()
            );
            eprintln!("scenario failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run_scenario() -> StoreResult<Vec<String>> {
    let schema = Schema::new()
        .with(
            ModelDef::new("Thread", "name")
                .field(Field::attr("name"))
                .field(Field::many("members", "Member").inverse("thread"))
                .field(Field::attr("member_count").compute(|thread| {
                    Ok(thread.many("members")?.len()? as i64)
                })),
        )?
        .with(
            ModelDef::new("Member", "name")
                .field(Field::attr("name"))
                .field(Field::one("thread", "Thread")),
        )?;
    let store = Store::new(schema)?;

    let general = store.model("Thread")?.insert("General")?;
    let members = general.many("members")?;
    members.push(["John", "Marc"])?;
    let mut lines = vec![format!(
        "scenario members={} count={}",
        names(&members.records()?)?,
        general.get("member_count")?
    )];

    let john = store
        .get("Member", "John")?
        .ok_or_else(|| lazyrecord_core::StoreError::callback("John was not inserted"))?;
    john.delete()?;
    lines.push(format!(
        "scenario after_delete members={} count={}",
        names(&members.records()?)?,
        general.get("member_count")?
    ));
    Ok(lines)
}

fn names(records: &[lazyrecord_core::Record]) -> StoreResult<String> {
    let names = records
        .iter()
        .map(|record| record.get("name").map(|name| name.to_string()))
        .collect::<StoreResult<Vec<_>>>()?;
    Ok(names.join(","))
}
