use crate::constants::light::MAX_LIGHT;

/// Which of the two light planes an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LightChannel {
    /// Sunlight entering from above the world
    Sky,
    /// Light from emitting blocks such as torches
    Block,
}

impl LightChannel {
    pub const ALL: [LightChannel; 2] = [LightChannel::Sky, LightChannel::Block];
}

/// Light level (0-15) with separate sky and block light components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LightLevel {
    /// Skylight level (0-15), stored without the daylight factor
    pub sky: u8,
    /// Block light level (0-15)
    pub block: u8,
}

impl LightLevel {
    pub fn new(sky: u8, block: u8) -> Self {
        Self {
            sky: sky.min(MAX_LIGHT),
            block: block.min(MAX_LIGHT),
        }
    }

    /// Create a dark light level
    pub fn dark() -> Self {
        Self { sky: 0, block: 0 }
    }

    /// Create a fully lit skylight level
    pub fn full_sky() -> Self {
        Self {
            sky: MAX_LIGHT,
            block: 0,
        }
    }

    pub fn get(&self, channel: LightChannel) -> u8 {
        match channel {
            LightChannel::Sky => self.sky,
            LightChannel::Block => self.block,
        }
    }

    /// Brighter of the two channels
    pub fn max_light(&self) -> u8 {
        self.sky.max(self.block)
    }

    /// Light as seen at a given daylight factor; sky is scaled, block is not
    pub fn effective(&self, daylight: f32) -> u8 {
        let sky = (self.sky as f32 * daylight.clamp(0.0, 1.0)).round() as u8;
        sky.max(self.block)
    }
}
