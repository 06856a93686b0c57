use anyhow::Result;
use clap::Parser;
use fox_beacon::{Conversion, ConvertArgs, convert};
use std::process;

fn main() -> Result<()> {
    env_logger::init();
    let args = ConvertArgs::parse();

    let conversion = convert(&args)?;
    println!("{}", conversion.text());

    if let Conversion::Usage = conversion {
        process::exit(conversion.exit_code());
    }

    Ok(())
}
