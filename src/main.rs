// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

mod config;
mod globe;
mod top_bar;

use std::time::Duration;

use clap::Parser;
use config::{AppConfig, TimeFormat};
use eframe::egui;
use globe::GlobeView;
use log::{error, info, warn};
use top_bar::TopBar;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const FRAME_INTERVAL: Duration = Duration::from_millis(16);

/// Desktop dashboard with a rotating weather globe
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Location for current conditions (e.g. "Paris, France")
    #[arg(long)]
    location: Option<String>,

    /// Weather tile zoom level
    #[arg(long)]
    zoom: Option<u8>,

    /// Clock style
    #[arg(long, value_enum)]
    time_format: Option<TimeFormat>,

    /// Default log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Persist the effective configuration
    #[arg(long)]
    save_config: bool,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(location) = &self.location {
            config.location.clone_from(location);
        }
        if let Some(zoom) = self.zoom {
            config.zoom = zoom;
        }
        if let Some(time_format) = self.time_format {
            config.time_format = time_format;
        }
    }
}

fn load_config() -> AppConfig {
    match AppConfig::load() {
        Ok(config) => {
            if let Ok(path) = AppConfig::get_config_path() {
                info!("Loaded configuration from {}", path.display());
            }
            config
        }
        Err(e) => {
            warn!("Failed to load configuration, using defaults: {}", e);
            AppConfig::default()
        }
    }
}

fn main() -> Result<(), eframe::Error> {
    let args = Args::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(args.log_level.as_str()),
    )
    .init();

    let mut config = load_config();
    args.apply(&mut config);

    if args.save_config {
        if let Err(e) = config.save() {
            error!("Failed to save configuration: {}", e);
        }
    }

    info!("Starting Globe Dashboard for {}", config.location);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1280.0, 900.0])
            .with_title("Globe Dashboard"),
        ..Default::default()
    };

    eframe::run_native(
        "Globe Dashboard",
        options,
        Box::new(move |_cc| Ok(Box::new(DashboardApp::new(&config)?))),
    )
}

struct DashboardApp {
    top_bar: TopBar,
    globe: GlobeView,
    // Dropped last so the panels cancel their tasks before the runtime stops.
    #[allow(dead_code, reason = "owns the tasks spawned by the panels")]
    runtime: tokio::runtime::Runtime,
}

impl std::fmt::Debug for DashboardApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DashboardApp")
            .field("top_bar", &self.top_bar)
            .field("globe", &self.globe)
            .finish_non_exhaustive()
    }
}

impl DashboardApp {
    fn new(config: &AppConfig) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Runtime::new()?;
        let top_bar = TopBar::new(&runtime, config);
        let globe = GlobeView::mount(&runtime, config);

        Ok(Self {
            top_bar,
            globe,
            runtime,
        })
    }
}

impl eframe::App for DashboardApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // The globe spins continuously
        ctx.request_repaint_after(FRAME_INTERVAL);

        egui::TopBottomPanel::top("top_bar")
            .exact_height(72.0)
            .show(ctx, |ui| {
                self.top_bar.show(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.globe.show(ui);
        });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Shutting down");
        self.globe.unmount();
        self.top_bar.shutdown();
    }
}
