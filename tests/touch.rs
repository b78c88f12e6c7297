mod tests {
    use std::time::Duration;

    use marquee_lights::touch::{is_contact, TOUCHED_READING, UNTOUCHED_READING};
    use marquee_lights::{Error, TouchChannel, TouchDebouncer, TouchEvent};

    const T: Duration = Duration::from_millis(200);

    fn hold(debouncer: &mut TouchDebouncer, channel: TouchChannel, ticks: usize) -> Vec<TouchEvent> {
        (0..ticks)
            .filter_map(|_| debouncer.sample(channel, TOUCHED_READING))
            .collect()
    }

    #[test]
    fn test_contact_threshold() {
        assert!(is_contact(1));
        assert!(is_contact(499));
        assert!(!is_contact(500));
        assert!(!is_contact(0));
        assert!(!is_contact(UNTOUCHED_READING));
    }

    #[test]
    fn test_continuous_touch_presses_once() {
        let mut debouncer = TouchDebouncer::new(T);
        let events = hold(&mut debouncer, TouchChannel::Power, 3);
        assert_eq!(events, vec![TouchEvent::Pressed(TouchChannel::Power)]);

        assert_eq!(
            debouncer.sample(TouchChannel::Power, UNTOUCHED_READING),
            Some(TouchEvent::Released {
                channel: TouchChannel::Power,
                held: T * 3
            })
        );
        assert_eq!(debouncer.state(TouchChannel::Power).held, Duration::ZERO);
    }

    #[test]
    fn test_separate_touches_press_separately() {
        let mut debouncer = TouchDebouncer::new(T);
        assert_eq!(hold(&mut debouncer, TouchChannel::Cycle, 2).len(), 1);
        debouncer.sample(TouchChannel::Cycle, UNTOUCHED_READING);
        assert_eq!(
            hold(&mut debouncer, TouchChannel::Cycle, 2),
            vec![TouchEvent::Pressed(TouchChannel::Cycle)]
        );
    }

    #[test]
    fn test_idle_pad_is_silent() {
        let mut debouncer = TouchDebouncer::new(T);
        for _ in 0..5 {
            assert_eq!(debouncer.sample(TouchChannel::Power, UNTOUCHED_READING), None);
        }
    }

    #[test]
    fn test_power_long_press_fires_once() {
        let mut debouncer = TouchDebouncer::new(T);
        let events = hold(&mut debouncer, TouchChannel::Power, 100);
        assert_eq!(
            events,
            vec![
                TouchEvent::Pressed(TouchChannel::Power),
                TouchEvent::LongPressed(TouchChannel::Power)
            ]
        );
        assert!(debouncer.state(TouchChannel::Power).long_press_latched);

        // Latch clears on release
        debouncer.sample(TouchChannel::Power, UNTOUCHED_READING);
        assert!(!debouncer.state(TouchChannel::Power).long_press_latched);
    }

    #[test]
    fn test_long_press_needs_threshold() {
        let mut debouncer = TouchDebouncer::new(T);
        // 50 ticks is exactly 10s, not past it
        let events = hold(&mut debouncer, TouchChannel::Power, 50);
        assert!(!events.contains(&TouchEvent::LongPressed(TouchChannel::Power)));
        assert_eq!(
            debouncer.sample(TouchChannel::Power, TOUCHED_READING),
            Some(TouchEvent::LongPressed(TouchChannel::Power))
        );
    }

    #[test]
    fn test_only_power_long_presses() {
        let mut debouncer = TouchDebouncer::new(T);
        let events = hold(&mut debouncer, TouchChannel::Cycle, 100);
        assert_eq!(events, vec![TouchEvent::Pressed(TouchChannel::Cycle)]);
    }

    #[test]
    fn test_brightness_free_runs() {
        let mut debouncer = TouchDebouncer::new(T);
        let events = hold(&mut debouncer, TouchChannel::Brightness, 4);
        assert_eq!(events, vec![TouchEvent::Held(TouchChannel::Brightness); 4]);
        assert_eq!(
            debouncer.sample(TouchChannel::Brightness, UNTOUCHED_READING),
            Some(TouchEvent::Released {
                channel: TouchChannel::Brightness,
                held: T * 4
            })
        );
    }

    #[test]
    fn test_channels_are_independent() {
        let mut debouncer = TouchDebouncer::new(T);
        assert_eq!(hold(&mut debouncer, TouchChannel::Power, 3).len(), 1);
        assert_eq!(
            debouncer.sample(TouchChannel::Cycle, TOUCHED_READING),
            Some(TouchEvent::Pressed(TouchChannel::Cycle))
        );
        assert_eq!(debouncer.state(TouchChannel::Power).held, T * 3);
        assert_eq!(debouncer.state(TouchChannel::Brightness).held, Duration::ZERO);
    }

    #[test]
    fn test_pad_names() {
        assert_eq!("power".parse::<TouchChannel>().unwrap(), TouchChannel::Power);
        assert_eq!(
            "brightness".parse::<TouchChannel>().unwrap(),
            TouchChannel::Brightness
        );
        assert!(matches!(
            "elbow".parse::<TouchChannel>(),
            Err(Error::UnknownTouchPad(pad)) if pad == "elbow"
        ));
    }
}
