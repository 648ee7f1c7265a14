//! Device setpoint types and the in-memory device mirror.

/// LED colour (global LED mode)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const OFF: Rgb = Rgb::new(0, 0, 0);
    pub const RED: Rgb = Rgb::new(255, 0, 0);
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level)
    }

    pub const fn blue(level: u8) -> Self {
        Self::new(0, 0, level)
    }

    pub const fn red(level: u8) -> Self {
        Self::new(level, 0, 0)
    }

    pub fn is_off(&self) -> bool {
        *self == Self::OFF
    }
}

/// Manual-mode vibration setpoint
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vibration {
    /// Hz
    pub frequency: f32,
    /// 0.0 ..= 1.0
    pub intensity: f32,
    /// The "go" flag; the motor only runs while this is set
    pub enable: bool,
}

impl Vibration {
    pub const OFF: Vibration = Vibration {
        frequency: 0.0,
        intensity: 0.0,
        enable: false,
    };

    pub const fn on(frequency: f32, intensity: f32) -> Self {
        Self {
            frequency,
            intensity,
            enable: true,
        }
    }

    /// Same parameters with the go flag cleared
    pub const fn halted(self) -> Self {
        Self {
            enable: false,
            ..self
        }
    }
}

/// A single hardware channel of a dot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    Thermal,
    Led,
    Vibration,
}

impl Channel {
    /// Order in which channels are returned to rest
    pub const RESET_ORDER: [Channel; 3] = [Channel::Thermal, Channel::Led, Channel::Vibration];

    const fn bit(self) -> u8 {
        match self {
            Channel::Thermal => 0b001,
            Channel::Led => 0b010,
            Channel::Vibration => 0b100,
        }
    }
}

/// Small set of channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSet(u8);

impl ChannelSet {
    pub const EMPTY: ChannelSet = ChannelSet(0);

    pub fn insert(&mut self, channel: Channel) {
        self.0 |= channel.bit();
    }

    pub fn remove(&mut self, channel: Channel) {
        self.0 &= !channel.bit();
    }

    pub fn union(self, other: ChannelSet) -> ChannelSet {
        ChannelSet(self.0 | other.0)
    }

    pub fn contains(&self, channel: Channel) -> bool {
        self.0 & channel.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Members in reset order (thermal, LED, vibration)
    pub fn in_reset_order(self) -> impl Iterator<Item = Channel> {
        Channel::RESET_ORDER
            .into_iter()
            .filter(move |c| self.contains(*c))
    }
}

/// Partial update written to one device in a single transaction.
/// Channels left as `None` keep their current setpoint.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChannelUpdate {
    pub led: Option<Rgb>,
    pub vibration: Option<Vibration>,
    pub thermal: Option<f32>,
}

impl ChannelUpdate {
    pub fn led(rgb: Rgb) -> Self {
        Self {
            led: Some(rgb),
            ..Self::default()
        }
    }

    pub fn vibration(vibration: Vibration) -> Self {
        Self {
            vibration: Some(vibration),
            ..Self::default()
        }
    }

    pub fn thermal(intensity: f32) -> Self {
        Self {
            thermal: Some(intensity),
            ..Self::default()
        }
    }

    pub fn with_led(mut self, rgb: Rgb) -> Self {
        self.led = Some(rgb);
        self
    }

    pub fn with_vibration(mut self, vibration: Vibration) -> Self {
        self.vibration = Some(vibration);
        self
    }

    pub fn with_thermal(mut self, intensity: f32) -> Self {
        self.thermal = Some(intensity);
        self
    }

    /// Rest value for one channel
    pub fn reset(channel: Channel) -> Self {
        match channel {
            Channel::Thermal => Self::thermal(0.0),
            Channel::Led => Self::led(Rgb::OFF),
            Channel::Vibration => Self::vibration(Vibration::OFF),
        }
    }

    /// Same update with the visual channel dropped
    pub fn without_led(mut self) -> Self {
        self.led = None;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.led.is_none() && self.vibration.is_none() && self.thermal.is_none()
    }

    pub fn channels(&self) -> ChannelSet {
        let mut set = ChannelSet::EMPTY;
        if self.thermal.is_some() {
            set.insert(Channel::Thermal);
        }
        if self.led.is_some() {
            set.insert(Channel::Led);
        }
        if self.vibration.is_some() {
            set.insert(Channel::Vibration);
        }
        set
    }
}

/// Mirrored setpoints of one device
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceState {
    pub led: Rgb,
    pub vibration: Vibration,
    /// -1.0 (cold) ..= 1.0 (hot)
    pub thermal: f32,
}

impl DeviceState {
    /// State after applying `update`, with out-of-range values clamped
    pub fn apply(&self, update: &ChannelUpdate) -> DeviceState {
        let mut next = *self;
        if let Some(led) = update.led {
            next.led = led;
        }
        if let Some(vibration) = update.vibration {
            next.vibration = Vibration {
                frequency: vibration.frequency.max(0.0),
                intensity: vibration.intensity.clamp(0.0, 1.0),
                enable: vibration.enable,
            };
        }
        if let Some(thermal) = update.thermal {
            next.thermal = thermal.clamp(-1.0, 1.0);
        }
        next
    }

    pub fn is_at_rest(&self) -> bool {
        self.led.is_off() && !self.vibration.enable && self.thermal == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_untouched_channels() {
        let state = DeviceState {
            led: Rgb::RED,
            vibration: Vibration::on(30.0, 0.3),
            thermal: 0.5,
        };
        let next = state.apply(&ChannelUpdate::led(Rgb::WHITE));
        assert_eq!(next.led, Rgb::WHITE);
        assert_eq!(next.vibration, state.vibration);
        assert_eq!(next.thermal, 0.5);
    }

    #[test]
    fn test_apply_clamps_out_of_range_values() {
        let next = DeviceState::default().apply(
            &ChannelUpdate::thermal(-3.0).with_vibration(Vibration::on(-5.0, 1.7)),
        );
        assert_eq!(next.thermal, -1.0);
        assert_eq!(next.vibration.intensity, 1.0);
        assert_eq!(next.vibration.frequency, 0.0);
    }

    #[test]
    fn test_channel_set_iterates_in_reset_order() {
        let mut set = ChannelSet::EMPTY;
        set.insert(Channel::Vibration);
        set.insert(Channel::Thermal);
        set.insert(Channel::Led);
        let order: Vec<_> = set.in_reset_order().collect();
        assert_eq!(order, vec![Channel::Thermal, Channel::Led, Channel::Vibration]);

        set.remove(Channel::Led);
        set.remove(Channel::Led);
        let order: Vec<_> = set.in_reset_order().collect();
        assert_eq!(order, vec![Channel::Thermal, Channel::Vibration]);
    }

    #[test]
    fn test_update_channels() {
        let update = ChannelUpdate::led(Rgb::RED).with_thermal(0.2);
        let set = update.channels();
        assert!(set.contains(Channel::Led));
        assert!(set.contains(Channel::Thermal));
        assert!(!set.contains(Channel::Vibration));
        assert!(update.without_led().channels().contains(Channel::Thermal));
        assert!(!update.without_led().channels().contains(Channel::Led));
    }

    #[test]
    fn test_reset_update_brings_device_to_rest() {
        let mut state = DeviceState {
            led: Rgb::WHITE,
            vibration: Vibration::on(41.2, 1.0),
            thermal: -1.0,
        };
        for channel in Channel::RESET_ORDER {
            state = state.apply(&ChannelUpdate::reset(channel));
        }
        assert!(state.is_at_rest());
    }
}
