use crate::math::deg_to_rad;
use nalgebra_glm::{Mat4, Vec3};

#[derive(Clone, Debug)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub position: Vec3,
    /// Euler angles in radians, x is pitch and z is yaw.
    pub rotation: Vec3,
}

impl PerspectiveCamera {
    pub fn new() -> Self {
        Self {
            fov: 70.0,
            position: Vec3::from_element(0.0),
            rotation: Vec3::from_element(0.0),
        }
    }

    pub fn looking_from(position: Vec3, pitch: f32, yaw: f32) -> Self {
        Self {
            position,
            rotation: Vec3::new(pitch, 0.0, yaw),
            ..Self::new()
        }
    }

    /// Camera at `position` facing `direction`. Roll is not representable and gets dropped.
    pub fn looking_along(position: Vec3, direction: &Vec3) -> Self {
        let d = nalgebra_glm::normalize(direction);
        let pitch = (-d.z).clamp(-1.0, 1.0).acos();
        let yaw = if pitch.sin().abs() > 1e-6 { (-d.x).atan2(d.y) } else { 0.0 };

        Self::looking_from(position, pitch, yaw)
    }

    pub fn view(&self) -> Mat4 {
        let pitch = nalgebra_glm::rotation(-self.rotation.x, &Vec3::new(1.0, 0.0, 0.0));
        let yaw = nalgebra_glm::rotation(-self.rotation.z, &Vec3::new(0.0, 0.0, 1.0));
        let eye = nalgebra_glm::translation(&-self.position);

        pitch * yaw * eye
    }

    pub fn camera_to_world(&self) -> Mat4 {
        nalgebra_glm::inverse(&self.view())
    }

    pub fn fov_y_radians(&self) -> f32 {
        deg_to_rad(self.fov)
    }
}

impl Default for PerspectiveCamera {
    fn default() -> Self {
        Self::new()
    }
}
