use std::{env, fs, path::PathBuf};

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let mut cmd = clap::Command::new("pricewatch")
        .version("1.0.0")
        .about("Extract competitor product and category data from web pages")
        .arg(clap::arg!(<INPUT> "Target URL or local HTML file"))
        .arg(clap::arg!(--categories "Discover the category tree instead of extracting products"))
        .arg(
            clap::arg!(-r --rules <FILE> "Selector rules JSON file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--save_rules "Persist repaired rules back to the rules file"))
        .arg(
            clap::arg!(--match_catalog <FILE> "Match extracted products against a catalog JSON file")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--base_url <URL> "Base URL for resolving links of a local file").value_name("URL"))
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_name("FILE")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(clap::arg!(--pretty "Pretty-print the JSON output"))
        .arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("20"))
        .arg(clap::arg!(--cookies <COOKIES> "Bypass cookies: raw Cookie value or JSON object").value_name("COOKIES"))
        .arg(clap::arg!(-v --verbose "Enable debug logging"));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "pricewatch", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "pricewatch", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "pricewatch", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "pricewatch", &completions_dir).unwrap();

    println!(
        "cargo:warning=Shell completions generated in: {}",
        completions_dir.display()
    );
}
