fn main() -> Result<(), Box<dyn std::error::Error>> {
    // server and client for both services: the plugin serves DevicePlugin,
    // dials Registration, and tests stand up a fake kubelet
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile_protos(&["proto/api.proto"], &["proto"])?;
    println!("cargo:rerun-if-changed=proto/api.proto");
    Ok(())
}
