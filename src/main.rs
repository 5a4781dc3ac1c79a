// src/main.rs

fn main() {
    if let Err(e) = parley_lib::run() {
        eprintln!("parley: {e}");
        std::process::exit(1);
    }
}
