fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        // mirror the driver's error code in the exit status
        let code = e.chain().find_map(|cause| {
            if let Some(d) = cause.downcast_ref::<capture_session::DriverError>() {
                Some(d.code)
            } else {
                cause.downcast_ref::<vmb::VmbError>().map(|v| v.code)
            }
        });
        std::process::exit(code.map(|c| c.unsigned_abs() as i32).unwrap_or(1));
    }
}

fn run() -> anyhow::Result<()> {
    let _shutdown = vmb_capture::ShutdownGuard::new();
    let lib = vmb_capture::library();
    let version_info = vmb::VersionInfo::new(lib)?;
    println!(
        "VmbC API Version {}.{}.{}",
        version_info.major, version_info.minor, version_info.patch
    );

    let n_cams = lib.n_cameras()?;
    println!("{} cameras found", n_cams);
    let camera_infos = lib.camera_info(n_cams)?;
    if !camera_infos.is_empty() {
        let cam_id = camera_infos[0].camera_id_string.as_str();
        println!("Opening camera {}", cam_id);
        println!("  {:?}", camera_infos[0]);

        let camera = vmb_capture::open_camera(cam_id)?;
        let pixel_format = camera.pixel_format()?;
        println!("  pixel_format: {:?}", pixel_format);

        let config = capture_session::SessionConfig::default();
        let (mut session, rx) = vmb_capture::connect(camera, config.clone());
        // best-effort; streaming works (less efficiently) without it
        if let Err(e) = session.driver().adjust_gvsp_packet_size(&config) {
            eprintln!("packet size negotiation failed, continuing: {}", e);
        }
        session.start()?;

        println!("acquiring frames for 1 second");
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(1);
        while let Some(timeout) = deadline.checked_duration_since(std::time::Instant::now()) {
            match rx.recv_timeout(timeout) {
                Ok(frame) => println!(
                    "got frame {:?} ({}x{}, {} bytes)",
                    frame.device_frame_id,
                    frame.width,
                    frame.height,
                    frame.image.len()
                ),
                Err(_) => break,
            }
        }
        println!("done acquiring frames");

        session.stop();
        println!("stats: {:?}", session.stats());
    }
    Ok(())
}
