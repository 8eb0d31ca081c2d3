fn main() {
    app_lib::run()
}
