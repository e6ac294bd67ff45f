use anyhow::Result;
use dialer_config::AppConfig;
use dialer_store::Store;
use serde::Serialize;
use std::io::{self, Write};

pub mod agents;
pub mod completions;
pub mod leads;
pub mod outcome;
pub mod recovery;
pub mod run;
pub mod stats;

pub struct Context<'a> {
    pub store: &'a Store,
    pub json: bool,
    pub config: &'a AppConfig,
}

pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
