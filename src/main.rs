fn main() {
    if let Err(err) = gqlscope::cli::run() {
        gqlscope::ui::eprintln_error(&err);
        std::process::exit(gqlscope::exit::exit_code(&err));
    }
}
