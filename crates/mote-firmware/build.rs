//! Forwards the node's build-time settings into the compiler environment.
//!
//! Values come from the process environment, or from a `.env` file next to
//! the manifest when they are not set there.

const KEYS: [&str; 4] = [
    "MOTE_WIFI_SSID",
    "MOTE_WIFI_PASSWORD",
    "MOTE_HOSTNAME",
    "MOTE_COLLECTOR",
];

fn main() {
    println!("cargo:rerun-if-changed=.env");
    if let Err(e) = dotenvy::dotenv() {
        println!("cargo:warning=no .env loaded ({e}), relying on the environment");
    }

    for key in KEYS {
        println!("cargo:rerun-if-env-changed={key}");
        match std::env::var(key) {
            Ok(value) => println!("cargo:rustc-env={key}={value}"),
            Err(_) => println!("cargo:warning={key} is not set, using the built-in default"),
        }
    }
}
