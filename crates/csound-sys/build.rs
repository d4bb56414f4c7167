fn main() {
    if std::env::var_os("CARGO_FEATURE_LINK").is_some() {
        if let Some(dir) = std::env::var_os("CSOUND_LIB_DIR") {
            println!("cargo:rustc-link-search=native={}", dir.to_string_lossy());
        }
        println!("cargo:rustc-link-lib=dylib=csound64");
    }
    println!("cargo:rerun-if-env-changed=CSOUND_LIB_DIR");
}
