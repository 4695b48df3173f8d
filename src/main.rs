#[cfg(feature = "cli")]
mod cli;

#[cfg(feature = "cli")]
fn main() {
    if let Err(err) = cli::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!(
        "oraculo-rs was built without the `cli` feature; use the library API or rebuild with `--features cli`."
    );
    std::process::exit(2);
}
