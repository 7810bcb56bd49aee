use std::time::Duration;

use glam::{Mat4, Vec3};

use crate::renderer::GPUWrite;

/// GLSL uniform blocks are column-major, matching glam
pub const COLUMN_MAJOR: bool = true;

const TURN_DEGREES_PER_SECOND: f32 = 90.0;
const FOV_Y_DEGREES: f32 = 45.0;
const Z_NEAR: f32 = 0.1;
const Z_FAR: f32 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C, align(16))]
pub struct MVPMatrices {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

impl GPUWrite for MVPMatrices {}

pub fn make_mvp_matrices(elapsed: Duration, aspect_ratio: f32, column_major: bool) -> MVPMatrices {
    let turn_radians = elapsed.as_secs_f32() * TURN_DEGREES_PER_SECOND.to_radians();

    let model = Mat4::from_rotation_z(turn_radians);
    let eye = Vec3::splat(2.0);
    let view = Mat4::look_at_rh(eye, Vec3::ZERO, Vec3::Z);
    let proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect_ratio, Z_NEAR, Z_FAR);

    let mut mvp = MVPMatrices { model, view, proj };

    // glam follows OpenGL clip space, where Y points up; Vulkan's points down
    mvp.proj.y_axis.y *= -1.0;

    if !column_major {
        mvp.model = mvp.model.transpose();
        mvp.view = mvp.view.transpose();
        mvp.proj = mvp.proj.transpose();
    }

    mvp
}

#[cfg(test)]
mod tests {
    use glam::{Vec4, Vec4Swizzles};

    use super::*;

    fn clip(mvp: &MVPMatrices, point: Vec3) -> Vec3 {
        let clip = mvp.proj * mvp.view * mvp.model * point.extend(1.0);
        clip.xyz() / clip.w
    }

    #[test]
    fn uniform_block_is_three_matrices() {
        assert_eq!(std::mem::size_of::<MVPMatrices>(), 192);
        assert_eq!(std::mem::align_of::<MVPMatrices>(), 16);
    }

    #[test]
    fn model_turns_ninety_degrees_per_second() {
        let mvp = make_mvp_matrices(Duration::from_secs(1), 1.0, true);
        let turned = mvp.model * Vec4::new(1.0, 0.0, 0.0, 1.0);

        assert!(turned.abs_diff_eq(Vec4::new(0.0, 1.0, 0.0, 1.0), 1e-5));
    }

    #[test]
    fn no_rotation_at_start() {
        let mvp = make_mvp_matrices(Duration::ZERO, 4.0 / 3.0, true);
        assert!(mvp.model.abs_diff_eq(Mat4::IDENTITY, 1e-6));
    }

    #[test]
    fn origin_lands_in_the_middle_of_the_screen() {
        let mvp = make_mvp_matrices(Duration::from_millis(250), 800.0 / 600.0, true);
        let ndc = clip(&mvp, Vec3::ZERO);

        assert!(ndc.x.abs() < 1e-5);
        assert!(ndc.y.abs() < 1e-5);
        assert!((0.0..=1.0).contains(&ndc.z));
    }

    #[test]
    fn up_is_negative_y_in_vulkan_clip_space() {
        let mvp = make_mvp_matrices(Duration::ZERO, 1.0, true);
        let above = clip(&mvp, Vec3::new(0.0, 0.0, 0.5));

        assert!(above.y < 0.0);
    }

    #[test]
    fn row_major_is_the_transpose() {
        let column = make_mvp_matrices(Duration::from_millis(700), 1.5, true);
        let row = make_mvp_matrices(Duration::from_millis(700), 1.5, false);

        assert_eq!(row.model, column.model.transpose());
        assert_eq!(row.view, column.view.transpose());
        assert_eq!(row.proj, column.proj.transpose());
    }
}
