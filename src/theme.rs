/// Colors of one sensor's chart.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SensorTheme {
    pub name: &'static str,
    pub series: (u8, u8, u8),
    pub background: (u8, u8, u8),
    pub foreground: (u8, u8, u8),
    pub grid: (u8, u8, u8),
}

/// Dark background, blue series.
pub const DARK: SensorTheme = SensorTheme {
    name: "dark",
    series: (0, 0, 255),
    background: (17, 17, 17),
    foreground: (242, 242, 242),
    grid: (40, 52, 66),
};

/// Light grey background with white grid, ggplot style.
pub const GGPLOT: SensorTheme = SensorTheme {
    name: "ggplot2",
    series: (0xcc, 0x42, 0x2f),
    background: (235, 235, 235),
    foreground: (51, 51, 51),
    grid: (255, 255, 255),
};

/// Sensor 2 is drawn in the ggplot theme, every other sensor in the dark one.
pub fn for_slot(slot: usize) -> SensorTheme {
    if slot == 2 {
        GGPLOT
    } else {
        DARK
    }
}
