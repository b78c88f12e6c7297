mod tests {
    use std::time::Duration;

    use marquee_lights::{
        BusEvent, CommandAdapter, Effect, EffectCommand, Error, Rgb, TouchChannel, TouchEvent,
        Topics,
    };

    fn adapter() -> CommandAdapter {
        CommandAdapter::new(Topics::with_prefix("sign"))
    }

    fn parse(topic: &str, payload: &str) -> marquee_lights::Result<EffectCommand> {
        adapter().from_message(topic, payload.as_bytes())
    }

    #[test]
    fn test_topics_from_prefix() {
        let topics = Topics::with_prefix("sign/");
        assert_eq!(
            topics.all(),
            [
                "sign/mode",
                "sign/control",
                "sign/color",
                "sign/speed",
                "sign/brightness"
            ]
        );
    }

    #[test]
    fn test_mode_messages() {
        assert_eq!(
            parse("sign/mode", "twinkle").unwrap(),
            EffectCommand::SetEffect(Effect::Twinkle)
        );
        assert_eq!(
            parse("sign/mode", "rmarquee").unwrap(),
            EffectCommand::SetEffect(Effect::RainbowMarquee)
        );
        assert!(matches!(
            parse("sign/mode", "disco"),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_control_messages_are_case_sensitive() {
        assert_eq!(parse("sign/control", "ON").unwrap(), EffectCommand::Power(true));
        assert_eq!(parse("sign/control", "OFF").unwrap(), EffectCommand::Power(false));
        assert!(parse("sign/control", "on").is_err());
    }

    #[test]
    fn test_color_messages() {
        assert_eq!(
            parse("sign/color", "00ff00").unwrap(),
            EffectCommand::SetPalette(Rgb::GREEN)
        );
        assert!(matches!(
            parse("sign/color", "green"),
            Err(Error::InvalidColor(_))
        ));
    }

    #[test]
    fn test_speed_messages() {
        assert_eq!(parse("sign/speed", "100").unwrap(), EffectCommand::SetSpeed(100));
        assert_eq!(parse("sign/speed", " 0 ").unwrap(), EffectCommand::SetSpeed(0));
        assert!(matches!(
            parse("sign/speed", "256"),
            Err(Error::ValueOutOfRange(256, 0, 255))
        ));
        assert!(matches!(
            parse("sign/speed", "fast"),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_brightness_messages() {
        assert_eq!(
            parse("sign/brightness", "200").unwrap(),
            EffectCommand::SetBrightness(200)
        );
        assert!(parse("sign/brightness", "300").is_err());
        assert!(parse("sign/brightness", "-1").is_err());
    }

    #[test]
    fn test_unknown_topic() {
        assert!(matches!(
            parse("other/mode", "rainbow"),
            Err(Error::UnknownTopic(_))
        ));
    }

    #[test]
    fn test_non_utf8_payload() {
        assert!(adapter().from_message("sign/mode", &[0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_bus_events() {
        let adapter = adapter();
        assert_eq!(
            adapter.from_bus_event(&BusEvent::Subscribed),
            Some(EffectCommand::Restart)
        );
        assert_eq!(adapter.from_bus_event(&BusEvent::Connected), None);
        assert_eq!(
            adapter.from_bus_event(&BusEvent::message("sign/speed", "nope")),
            None
        );
        assert_eq!(
            adapter.from_bus_event(&BusEvent::message("sign/control", "OFF")),
            Some(EffectCommand::Power(false))
        );
    }

    #[test]
    fn test_touch_events() {
        let released = |channel| TouchEvent::Released {
            channel,
            held: Duration::from_millis(400),
        };
        assert_eq!(
            CommandAdapter::from_touch(TouchEvent::Pressed(TouchChannel::Power)),
            Some(EffectCommand::TogglePower)
        );
        assert_eq!(
            CommandAdapter::from_touch(TouchEvent::Pressed(TouchChannel::Cycle)),
            Some(EffectCommand::Cycle)
        );
        assert_eq!(
            CommandAdapter::from_touch(TouchEvent::LongPressed(TouchChannel::Power)),
            Some(EffectCommand::LongPress)
        );
        assert_eq!(
            CommandAdapter::from_touch(TouchEvent::Held(TouchChannel::Brightness)),
            Some(EffectCommand::RampBrightness)
        );
        assert_eq!(
            CommandAdapter::from_touch(released(TouchChannel::Brightness)),
            Some(EffectCommand::PersistBrightness)
        );
        assert_eq!(CommandAdapter::from_touch(released(TouchChannel::Power)), None);
    }
}
