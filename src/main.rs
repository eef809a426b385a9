fn main() {
    if let Err(err) = homeboard_lib::run() {
        eprintln!("homeboard: {err:#}");
        std::process::exit(1);
    }
}
