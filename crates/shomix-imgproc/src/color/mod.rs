mod lab;

pub use lab::{lab_from_rgb, lab_to_rgb, lightness_from_rgb, rgb_from_lab, rgb_to_lab};
