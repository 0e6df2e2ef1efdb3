/// Threads per compute work group. The shaders are rendered with this value
/// by `build.rs`.
pub const WORKGROUP_SIZE: u32 = 256;

/// Work groups needed to cover `records` threads.
pub fn work_groups(records: u32) -> u32 {
    records.div_ceil(WORKGROUP_SIZE)
}

/// Rendered WGSL source of one of the shaders in `src/shaders`.
#[macro_export]
macro_rules! include_shader {
    ( $shader_name:expr ) => {
        include_str!(concat!(env!("OUT_DIR"), "/", "shaders", "/", $shader_name))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_group_rounding() {
        assert_eq!(work_groups(0), 0);
        assert_eq!(work_groups(1), 1);
        assert_eq!(work_groups(256), 1);
        assert_eq!(work_groups(257), 2);
    }

    #[test]
    fn shaders_rendered_with_workgroup_size() {
        let shader = crate::include_shader!("particles.wgsl");
        assert!(shader.contains("@workgroup_size(256)"));
        assert!(!shader.contains("{{"));
    }
}
