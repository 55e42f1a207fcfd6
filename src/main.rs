fn main() {
    cli_batteries::run(env!("CARGO_BIN_NAME"), trivia_realtime_core::async_main);
}
