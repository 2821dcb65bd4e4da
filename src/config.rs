/// Tunable policy values shared by calibration and the sweep.
#[derive(Debug, Clone)]
pub struct SweepConfig {
    /// Width frames are resized to before preprocessing.
    pub resize_width: u32,
    /// Height frames are resized to before preprocessing.
    pub resize_height: u32,
    /// How many following frames (by sorted index) each anchor is
    /// compared against.
    pub window: usize,
    /// Contour-area floor used while calibrating, before the real floor
    /// is known.
    pub seed_min_area: f64,
    /// Multiplier applied to the mean sample score to derive the
    /// similarity threshold.
    pub threshold_scale: f64,
    /// Multiplier applied to the mean contour area to derive the
    /// contour-area floor.
    pub area_scale: f64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            resize_width: 640,
            resize_height: 480,
            window: 3,
            seed_min_area: 500.0,
            threshold_scale: 0.5,
            area_scale: 0.2,
        }
    }
}
