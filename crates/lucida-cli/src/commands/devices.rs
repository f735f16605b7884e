use anyhow::Result;
use clap::{Args, ValueEnum};
use console::Style;
use lucida_core::compute::{create_backend, DevicePreference};

#[derive(Args)]
pub struct DevicesArgs {}

/// `--device` flag shared by the compute subcommands.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Gpu,
}

impl From<DeviceArg> for DevicePreference {
    fn from(arg: DeviceArg) -> Self {
        match arg {
            DeviceArg::Auto => DevicePreference::Auto,
            DeviceArg::Cpu => DevicePreference::Cpu,
            DeviceArg::Gpu => DevicePreference::Gpu,
        }
    }
}

pub fn run(_args: &DevicesArgs) -> Result<()> {
    let available = Style::new().green();
    let missing = Style::new().dim().yellow();
    let label = Style::new().bold();

    println!("Compute devices:");

    match create_backend(&DevicePreference::Cpu) {
        Ok(backend) => println!(
            "  {:<6}{}",
            label.apply_to("cpu"),
            available.apply_to(format!("{} (rustfft, any dimensions)", backend.name()))
        ),
        Err(e) => println!("  {:<6}{}", label.apply_to("cpu"), missing.apply_to(e)),
    }

    match create_backend(&DevicePreference::Gpu) {
        Ok(backend) => println!(
            "  {:<6}{}",
            label.apply_to("gpu"),
            available.apply_to(format!(
                "{} (wgpu, power-of-two dimensions)",
                backend.name()
            ))
        ),
        Err(e) => println!("  {:<6}{}", label.apply_to("gpu"), missing.apply_to(e)),
    }

    Ok(())
}
