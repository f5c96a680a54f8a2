mod app;
mod layout;
mod topo;

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Topology JSON file; the built-in demo topology is used when omitted.
    #[arg(long)]
    topology: Option<PathBuf>,
    /// Sibling partitions larger than this collapse into a paged group.
    #[arg(long, default_value_t = 4)]
    group_size: usize,
}

fn main() -> eframe::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = app::config::demo_config();
    config.group_size = args.group_size;
    if let Err(error) = config.validate() {
        eprintln!("invalid configuration: {error}");
        std::process::exit(2);
    }

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "topolens",
        options,
        Box::new(move |cc| {
            Ok(Box::new(app::TopolensApp::new(
                cc,
                args.topology.clone(),
                config.clone(),
            )))
        }),
    )
}
