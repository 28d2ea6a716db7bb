use clap::Parser;
use log::info;

mod app;
mod args;
mod camera;
mod err;
mod import;
mod material;
mod math;
mod mesh;
mod raytracer;
mod renderer;
mod scene;
mod shapes;
mod vulkan;

use err::AppError;

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = args::Args::parse();

    let app = app::App::create(&args)?;
    app.run(args)?;

    info!("Quitting app...");

    Ok(())
}
