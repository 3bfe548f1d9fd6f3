fn main() {
    if let Err(err) = feather_csv_lib::run() {
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
