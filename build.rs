use std::env;
use std::path::PathBuf;

fn main() {
    println!("cargo:rerun-if-env-changed=CANTERA_LIB_DIR");
    println!("cargo:rerun-if-env-changed=CONDA_PREFIX");

    // The Cantera C interface is only linked when the backend is compiled in
    if env::var_os("CARGO_FEATURE_CANTERA").is_none() {
        return;
    }

    // Explicit location first, then an active conda environment (how Cantera is usually installed)
    let lib_dir = env::var("CANTERA_LIB_DIR")
        .map(PathBuf::from)
        .ok()
        .or_else(|| env::var("CONDA_PREFIX").ok().map(|p| PathBuf::from(p).join("lib")));

    match lib_dir {
        Some(dir) => {
            if !dir.exists() {
                panic!("Cantera library directory {} does not exist", dir.display());
            }
            println!("cargo:rustc-link-search=native={}", dir.display());
        }
        None => {
            println!("cargo:warning=CANTERA_LIB_DIR not set, relying on the default linker search path");
        }
    }
}
