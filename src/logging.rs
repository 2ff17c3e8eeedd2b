/// Route `log` messages to stderr. The level defaults to `info` and can be
/// changed through `RUST_LOG`, e.g. `RUST_LOG=tripmerge=debug`.
pub fn setup() {
    use env_logger::{Builder, Env};
    Builder::from_env(Env::default().default_filter_or("info")).init();
}
