fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=proto/api.proto");

    // Compile the CRI runtime service definitions
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/api.proto"], &["proto"])?;

    Ok(())
}
