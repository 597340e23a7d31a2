//! Command-line entry point: runs one SCF calculation described by a YAML file.

use color_eyre::eyre::Result;

mod app;
mod config;
mod io;

use app::ScfApplication;

fn main() -> Result<()> {
    color_eyre::install()?;
    ScfApplication::from_cli()?.run()
}
