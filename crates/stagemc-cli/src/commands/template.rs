use crate::cli::TemplateArgs;
use crate::config::defaults::TEMPLATE;
use crate::error::{CliError, Result};
use std::fs;
use tracing::info;

pub fn run(args: TemplateArgs) -> Result<()> {
    if args.output.exists() && !args.force {
        return Err(CliError::Argument(format!(
            "'{}' already exists; pass --force to overwrite it",
            args.output.display()
        )));
    }

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(&args.output, TEMPLATE)?;

    info!("Wrote configuration template to {:?}", &args.output);
    println!("Configuration template written to: {}", args.output.display());
    Ok(())
}
