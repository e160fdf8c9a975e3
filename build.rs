use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use vergen_gitcl::{Emitter, GitclBuilder};

fn main() -> Result<()> {
    emit_git_describe()?;

    println!(
        "cargo:rustc-env=BUILD_TIMESTAMP={}",
        build_time()?.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!("cargo:rerun-if-env-changed=SOURCE_DATE_EPOCH");

    Ok(())
}

/// `VERGEN_GIT_DESCRIBE`, or nothing when building outside a git checkout.
fn emit_git_describe() -> Result<()> {
    let gitcl = GitclBuilder::default()
        .describe(true, true, Some("[0-9]*"))
        .build()?;

    let emitted = Emitter::default()
        .idempotent()
        .fail_on_error()
        .add_instructions(&gitcl)
        .and_then(|emitter| emitter.emit());

    if let Err(e) = emitted {
        println!("cargo:warning=git describe unavailable: {e}");
        Emitter::default().idempotent().emit()?;
    }
    Ok(())
}

/// Honors `SOURCE_DATE_EPOCH` for reproducible builds.
fn build_time() -> Result<DateTime<Utc>> {
    let Ok(epoch) = std::env::var("SOURCE_DATE_EPOCH") else {
        return Ok(Utc::now());
    };
    let secs = epoch
        .parse::<i64>()
        .with_context(|| format!("SOURCE_DATE_EPOCH is not a number: {epoch}"))?;
    Utc.timestamp_opt(secs, 0)
        .single()
        .with_context(|| format!("SOURCE_DATE_EPOCH out of range: {epoch}"))
}
