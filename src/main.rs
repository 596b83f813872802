fn main() -> std::process::ExitCode {
    servermaker_lib::run()
}
