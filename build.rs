fn main() {
    // The build identifier is advertised over MQTT and compared against the
    // remote version on `ota/version`; rebuild whenever it changes.
    println!("cargo:rerun-if-env-changed=BUILD");
    println!("cargo:rerun-if-env-changed=JURA_MQTT_URI");
    println!("cargo:rerun-if-env-changed=JURA_NTP_SERVER");
    println!("cargo:rerun-if-env-changed=JURA_WIFI_SSID");
    println!("cargo:rerun-if-env-changed=JURA_WIFI_PASSWORD");

    #[cfg(feature = "espidf")]
    embuild::espidf::sysenv::output();
}
