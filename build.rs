//! Compiles `proto/geolocation.proto` into the `geolocation.v1` module
//! included by `src/rpc/mod.rs`.

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tonic_build::configure().build_server(true).build_client(true).compile(
        &["proto/geolocation.proto"],
        &["proto"],
    )?;

    Ok(())
}
