//! Grab a few frames with the blocking `VmbCaptureFrameWait` path.

const N_FRAMES: usize = 5;
const TIMEOUT_MSEC: u32 = 2000;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let lib = vmb::VmbLibrary::new()?;
    let n_cams = lib.n_cameras()?;
    let camera_infos = lib.camera_info(n_cams)?;
    let Some(info) = camera_infos.first() else {
        println!("No camera, nothing to do.");
        return Ok(());
    };

    let cam_id = info.camera_id_string.as_str();
    println!("Opening camera {}", cam_id);
    let camera = vmb::Camera::open(cam_id, vmb::access_mode::FULL, &lib.raw)?;
    println!("  pixel format: {:?}", camera.pixel_format()?);

    let mut frame = camera.alloc_frame()?;
    camera.frame_announce(&mut frame)?;
    camera.capture_start()?;

    for _ in 0..N_FRAMES {
        camera.capture_frame_queue(&mut frame)?;
        camera.command_run("AcquisitionStart")?;
        camera.capture_frame_wait(&mut frame, TIMEOUT_MSEC)?;
        camera.command_run("AcquisitionStop")?;
        if frame.is_complete() {
            println!(
                "frame {:?}: {}x{}, {} bytes",
                frame.frame_id(),
                frame.width(),
                frame.height(),
                frame.buffer().len()
            );
        } else {
            println!("frame not complete: {:?}", frame.status());
        }
    }

    camera.capture_end()?;
    camera.capture_queue_flush()?;
    camera.frame_revoke(&mut frame)?;
    camera.close()?;
    Ok(())
}
