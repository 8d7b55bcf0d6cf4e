#[path = "build/config.rs"]
mod config;

fn main() {
    config::config::Cfgs::new().apply();
}
