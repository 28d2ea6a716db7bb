use nalgebra_glm::{Vec4, vec4};

pub fn deg_to_rad(deg: f32) -> f32 {
    deg / (180.0 / std::f32::consts::PI)
}

pub fn rad_to_deg(rad: f32) -> f32 {
    rad * (180.0 / std::f32::consts::PI)
}

/// Packs a linear color into RGBA8, red in the lowest byte.
pub fn pack_color(color: &Vec4) -> u32 {
    let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;

    channel(color.x) | (channel(color.y) << 8) | (channel(color.z) << 16) | (channel(color.w) << 24)
}

pub fn unpack_color(packed: u32) -> Vec4 {
    let channel = |shift: u32| ((packed >> shift) & 0xff) as f32 / 255.0;

    vec4(channel(0), channel(8), channel(16), channel(24))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_puts_red_in_low_byte() {
        assert_eq!(pack_color(&vec4(1.0, 0.0, 0.0, 0.0)), 0x0000_00ff);
        assert_eq!(pack_color(&vec4(0.0, 0.0, 0.0, 1.0)), 0xff00_0000);
        assert_eq!(pack_color(&vec4(0.0, 1.0, 0.0, 1.0)), 0xff00_ff00);
    }

    #[test]
    fn pack_clamps_out_of_range() {
        assert_eq!(pack_color(&vec4(2.0, -1.0, 0.5, 1.0)), 0xff80_00ff);
    }

    #[test]
    fn unpack_reverses_pack() {
        let color = unpack_color(pack_color(&vec4(0.2, 0.4, 0.6, 0.8)));

        assert!((color.x - 0.2).abs() < 1.0 / 255.0);
        assert!((color.y - 0.4).abs() < 1.0 / 255.0);
        assert!((color.z - 0.6).abs() < 1.0 / 255.0);
        assert!((color.w - 0.8).abs() < 1.0 / 255.0);
    }

    #[test]
    fn degrees_convert() {
        assert!((deg_to_rad(180.0) - std::f32::consts::PI).abs() < 1e-6);
        assert!((rad_to_deg(std::f32::consts::FRAC_PI_2) - 90.0).abs() < 1e-4);
    }
}
