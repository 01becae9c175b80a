fn main() -> anyhow::Result<()> {
    env_logger::init();
    let lib = vmb::VmbLibrary::new()?;
    let n_cams = lib.n_cameras()?;
    let camera_infos = lib.camera_info(n_cams)?;
    if !camera_infos.is_empty() {
        let cam_id = camera_infos[0].camera_id_string.as_str();
        println!("Opening camera {}", cam_id);
        let camera = vmb::Camera::open(cam_id, vmb::access_mode::FULL, &lib.raw)?;
        let settings = vmb::default_feature_persist_settings();
        let settings_path = format!("{}.xml", cam_id);
        println!("  saving settings to: {}", settings_path);
        camera.settings_save(settings_path, &settings)?;
    }
    Ok(())
}
