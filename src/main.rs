fn main() {
    if let Err(err) = tabload::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
