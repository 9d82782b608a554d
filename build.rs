fn main() {
    // ESP-IDF linker/sysroot glue applies only when targeting the chip;
    // host builds (tests, simulation) skip it.
    if std::env::var("CARGO_CFG_TARGET_OS").as_deref() == Ok("espidf") {
        embuild::espidf::sysenv::output();
    }
}
