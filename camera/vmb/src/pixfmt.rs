//! Mapping between VmbC pixel format identifiers and
//! [machine_vision_formats::PixFmt].

use machine_vision_formats as formats;

use crate::error::{Error, Result};

pub fn pixel_format_code(code: u32) -> Result<formats::PixFmt> {
    use formats::PixFmt::*;
    use vmbc_sys::VmbPixelFormatType::*;
    #[allow(non_upper_case_globals)]
    let fmt = match code {
        VmbPixelFormatMono8 => Mono8,
        VmbPixelFormatBayerGR8 => BayerGR8,
        VmbPixelFormatBayerRG8 => BayerRG8,
        VmbPixelFormatBayerGB8 => BayerGB8,
        VmbPixelFormatBayerBG8 => BayerBG8,
        VmbPixelFormatRgb8 => RGB8,
        _ => {
            return Err(Error::UnknownPixelFormatCode { code });
        }
    };
    Ok(fmt)
}

pub fn str_to_pixel_format(pixel_format: &str) -> Result<formats::PixFmt> {
    use formats::PixFmt::*;
    Ok(match pixel_format {
        "Mono8" => Mono8,
        "RGB8" => RGB8,
        "BayerGR8" => BayerGR8,
        "BayerRG8" => BayerRG8,
        "BayerGB8" => BayerGB8,
        "BayerBG8" => BayerBG8,
        fmt => {
            return Err(Error::UnknownPixelFormat {
                fmt: fmt.to_string(),
            });
        }
    })
}

pub fn pixel_format_to_str(pixfmt: formats::PixFmt) -> Result<&'static str> {
    use formats::PixFmt::*;
    Ok(match pixfmt {
        Mono8 => "Mono8",
        RGB8 => "RGB8",
        BayerGR8 => "BayerGR8",
        BayerRG8 => "BayerRG8",
        BayerGB8 => "BayerGB8",
        BayerBG8 => "BayerBG8",
        _ => {
            return Err(Error::UnknownPixelFormat {
                fmt: format!("pixfmt {:?}", pixfmt),
            });
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_mapping_is_symmetric() {
        for name in ["Mono8", "RGB8", "BayerGR8", "BayerRG8", "BayerGB8", "BayerBG8"] {
            let fmt = str_to_pixel_format(name).unwrap();
            assert_eq!(pixel_format_to_str(fmt).unwrap(), name);
        }
        assert!(str_to_pixel_format("Mono12Packed").is_err());
    }
}
