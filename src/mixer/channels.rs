use super::MixerState;

/// The change subscription of the active channel
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub channel: String,
    /// Bumped every time a channel is subscribed, never reused
    pub serial: u64,
    /// The state last reported for this channel
    last: Option<MixerState>,
}

/// Playback channels of the open device, in discovery order, and the one
/// that is currently subscribed to
#[derive(Debug, Default)]
pub struct ChannelRegistry {
    names: Vec<String>,
    subscription: Option<Subscription>,
    serial: u64,
}

impl ChannelRegistry {
    pub fn new(names: Vec<String>) -> Self {
        Self {
            names,
            ..Default::default()
        }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name)
    }

    /// The channel to select at setup: `requested` if it exists, otherwise
    /// whatever was discovered first
    pub fn initial<'a>(&'a self, requested: Option<&'a str>) -> Option<&'a str> {
        match requested {
            Some(name) if self.contains(name) => Some(name),
            _ => self.names.first().map(String::as_str),
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.subscription.as_ref().map(|s| s.channel.as_str())
    }

    pub fn subscription(&self) -> Option<&Subscription> {
        self.subscription.as_ref()
    }

    /// Replace the subscription with one for `channel`.
    ///
    /// Returns false and keeps the current subscription when `channel` is
    /// already the active one.
    pub fn subscribe(&mut self, channel: &str) -> bool {
        if self.active() == Some(channel) {
            return false;
        }

        self.serial += 1;
        self.subscription = Some(Subscription {
            channel: channel.to_owned(),
            serial: self.serial,
            last: None,
        });
        true
    }

    /// Remember `state` as the latest known state of the active channel.
    /// Returns true when it differs from what was recorded before.
    pub fn observe(&mut self, state: MixerState) -> bool {
        match self.subscription.as_mut() {
            Some(sub) if sub.last != Some(state) => {
                let changed = sub.last.is_some();
                sub.last = Some(state);
                changed
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(vec!["Master".into(), "PCM".into(), "Headphone".into()])
    }

    #[test]
    fn names_keep_discovery_order() {
        assert_eq!(registry().names(), ["Master", "PCM", "Headphone"]);
    }

    #[test]
    fn initial_falls_back_to_first() {
        let reg = registry();
        assert_eq!(reg.initial(None), Some("Master"));
        assert_eq!(reg.initial(Some("PCM")), Some("PCM"));
        assert_eq!(reg.initial(Some("Surround")), Some("Master"));
        assert_eq!(ChannelRegistry::default().initial(Some("PCM")), None);
    }

    #[test]
    fn subscribing_twice_keeps_serial() {
        let mut reg = registry();
        assert!(reg.subscribe("PCM"));
        let first = reg.subscription().cloned();
        assert!(!reg.subscribe("PCM"));
        assert_eq!(reg.subscription().cloned(), first);

        assert!(reg.subscribe("Master"));
        assert_eq!(reg.subscription().map(|s| s.serial), Some(2));
    }

    #[test]
    fn observe_reports_only_changes() {
        let mut reg = registry();
        let state = MixerState {
            volume: 40,
            mute: false,
        };
        // nothing is active yet
        assert!(!reg.observe(state));

        reg.subscribe("Master");
        assert!(!reg.observe(state));
        assert!(!reg.observe(state));
        assert!(reg.observe(MixerState { mute: true, ..state }));

        // a fresh subscription starts without history
        reg.subscribe("PCM");
        assert!(!reg.observe(state));
    }
}
