#![forbid(unsafe_code)]

fn main() {
    std::process::exit(obridge_cli::run());
}
