fn main() -> anyhow::Result<()> {
    env_logger::init();
    let lib = vmb::VmbLibrary::new()?;
    let version = vmb::VersionInfo::new(&lib)?;
    println!(
        "VmbC API version {}.{}.{}",
        version.major, version.minor, version.patch
    );

    let n_cams = lib.n_cameras()?;
    println!("{} cameras found", n_cams);
    for info in lib.camera_info(n_cams)? {
        println!(
            "  {} ({}, serial {}) via {:?}",
            info.camera_id_string, info.model_name, info.serial_string, info.interface
        );
    }
    // When `lib` is dropped, `VmbShutdown` is called.
    Ok(())
}
