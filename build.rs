fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Source a protoc binary from the vendored crate when none is
    // present on the system, so the build does not depend on a
    // separately installed protobuf compiler.
    if std::env::var_os("PROTOC").is_none() {
        if let Ok(protoc) = protoc_bin_vendored::protoc_bin_path() {
            std::env::set_var("PROTOC", protoc);
        }
    }

    println!("cargo:rerun-if-changed=proto/gateway.proto");
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/gateway.proto"], &["proto"])?;
    Ok(())
}
