use cgmath::Vector2;

/// Moves the emission anchor along a fixed figure so the driver has
/// something to emit from without user input.
#[derive(Debug, Clone, Copy)]
pub struct EmitterPath {
    aspect_ratio: f32,
    position: Vector2<f32>,
    velocity: Vector2<f32>,
}

impl EmitterPath {
    pub fn new(aspect_ratio: f32) -> Self {
        EmitterPath {
            aspect_ratio,
            position: Vector2::new(0.0, 0.0),
            // Must not start at rest.
            velocity: Vector2::new(0.001, 0.001),
        }
    }

    pub fn update(&mut self, time: f32) {
        let next = Vector2::new(
            (time * 2.0).sin() * self.aspect_ratio * 0.9,
            (time * 2.0).cos() * 0.15,
        );
        self.velocity = (next - self.position) * 10.0;
        self.position = next;
    }

    pub fn anchor(&self) -> [f32; 2] {
        self.position.into()
    }

    pub fn velocity(&self) -> [f32; 2] {
        self.velocity.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_path() {
        let mut path = EmitterPath::new(2.0);
        assert_eq!(path.velocity(), [0.001, 0.001]);
        path.update(0.0);
        assert_eq!(path.anchor(), [0.0, 0.15]);
        assert!((path.velocity()[1] - 1.5).abs() < 1e-6);
        path.update(std::f32::consts::FRAC_PI_4);
        let [x, y] = path.anchor();
        assert!((x - 1.8).abs() < 1e-5);
        assert!(y.abs() < 1e-5);
    }
}
