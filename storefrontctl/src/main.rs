use clap::Parser;

fn main() {
    let cli = storefrontctl::Cli::parse();
    if let Err(err) = storefrontctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
