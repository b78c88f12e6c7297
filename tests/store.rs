mod tests {
    use marquee_lights::store::{KEY_BRIGHTNESS, KEY_EFFECT, KEY_PALETTE, KEY_SPEED, NAMESPACE};
    use marquee_lights::{
        ConfigStore, Effect, Error, FileStore, KeyValueStore, MemoryStore, PersistedConfig, Rgb,
        Value,
    };

    #[test]
    fn test_missing_key_is_not_an_error() {
        let store = ConfigStore::new(MemoryStore::new());
        assert_eq!(store.get_u8(KEY_SPEED).unwrap(), None);
        assert_eq!(store.get_str(KEY_PALETTE).unwrap(), None);
    }

    #[test]
    fn test_wrong_type_is_reported() {
        let store = ConfigStore::new(MemoryStore::with_values([(KEY_SPEED, Value::from("fast"))]));
        assert!(matches!(
            store.get_u8(KEY_SPEED),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_write_only_if_changed() {
        let backend = MemoryStore::new();
        let mut store = ConfigStore::new(backend.clone());

        assert!(store.set_u8(KEY_SPEED, 155).unwrap());
        assert!(!store.set_u8(KEY_SPEED, 155).unwrap());
        assert_eq!(backend.writes(), 1);
        assert_eq!(backend.commits(), 1);

        assert!(store.set_u8(KEY_SPEED, 10).unwrap());
        assert_eq!(backend.writes(), 2);
        assert_eq!(store.get_u8(KEY_SPEED).unwrap(), Some(10));

        assert!(store.set_str(KEY_PALETTE, "#ff0000").unwrap());
        assert!(!store.set_str(KEY_PALETTE, "#ff0000").unwrap());
        assert_eq!(backend.commits(), 3);
    }

    #[test]
    fn test_batch_commits_once() {
        let backend = MemoryStore::with_values([(KEY_SPEED, Value::U8(100))]);
        let mut store = ConfigStore::new(backend.clone());

        let written = store
            .store([
                (KEY_SPEED, Value::U8(100)),
                (KEY_BRIGHTNESS, Value::U8(200)),
                (KEY_EFFECT, Value::U8(5)),
            ])
            .unwrap();
        assert_eq!(written, vec![KEY_BRIGHTNESS, KEY_EFFECT]);
        assert_eq!(backend.commits(), 1);

        let written = store.store([(KEY_EFFECT, Value::U8(5))]).unwrap();
        assert!(written.is_empty());
        assert_eq!(backend.commits(), 1);
    }

    #[test]
    fn test_failed_write_surfaces() {
        let backend = MemoryStore::new();
        backend.fail_writes(true);
        let mut store = ConfigStore::new(backend.clone());
        assert!(matches!(store.set_u8(KEY_EFFECT, 2), Err(Error::Storage(_))));
        assert_eq!(backend.commits(), 0);
    }

    #[test]
    fn test_load_defaults() {
        let store = ConfigStore::new(MemoryStore::new());
        let config = store.load();
        assert_eq!(config, PersistedConfig::default());
        assert_eq!(config.effect, Effect::Rainbow);
        assert_eq!(config.palette, Rgb::WARM);
        assert_eq!(config.speed, 100);
        assert_eq!(config.brightness, 64);
    }

    #[test]
    fn test_load_stored_values() {
        let store = ConfigStore::new(MemoryStore::with_values([
            (KEY_PALETTE, Value::from("#00ff00")),
            (KEY_SPEED, Value::U8(30)),
            (KEY_BRIGHTNESS, Value::U8(200)),
            (KEY_EFFECT, Value::U8(Effect::Marquee.ordinal())),
        ]));
        assert_eq!(
            store.load(),
            PersistedConfig {
                palette: Rgb::GREEN,
                speed: 30,
                brightness: 200,
                effect: Effect::Marquee,
            }
        );
    }

    #[test]
    fn test_load_skips_bad_values() {
        let store = ConfigStore::new(MemoryStore::with_values([
            (KEY_PALETTE, Value::from("orange")),
            (KEY_SPEED, Value::from("slow")),
            (KEY_EFFECT, Value::U8(42)),
        ]));
        assert_eq!(store.load(), PersistedConfig::default());
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut store = ConfigStore::new(FileStore::open(&path, NAMESPACE).unwrap());
        assert_eq!(store.load(), PersistedConfig::default());
        store
            .store([
                (KEY_EFFECT, Value::U8(Effect::Twinkle.ordinal())),
                (KEY_PALETTE, Value::from("#0000ff")),
            ])
            .unwrap();

        let reopened = ConfigStore::new(FileStore::open(&path, NAMESPACE).unwrap());
        let config = reopened.load();
        assert_eq!(config.effect, Effect::Twinkle);
        assert_eq!(config.palette, Rgb::BLUE);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json[NAMESPACE][KEY_EFFECT], 5);
        assert_eq!(json[NAMESPACE][KEY_PALETTE], "#0000ff");
    }

    #[test]
    fn test_file_store_namespaces_are_separate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let mut other = FileStore::open(&path, "other").unwrap();
        other.set(KEY_SPEED, Value::U8(42)).unwrap();
        other.commit().unwrap();

        let store = FileStore::open(&path, NAMESPACE).unwrap();
        assert_eq!(store.get(KEY_SPEED).unwrap(), None);
    }

    #[test]
    fn test_file_store_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            FileStore::open(&path, NAMESPACE),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_file_store_out_of_range_value_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, r#"{"iot_lights":{"brightness":300,"effect":5}}"#).unwrap();

        let store = FileStore::open(&path, NAMESPACE).unwrap();
        assert!(matches!(
            store.get(KEY_BRIGHTNESS),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(store.get(KEY_EFFECT).unwrap(), Some(Value::U8(5)));

        let mut store = ConfigStore::new(store);
        let config = store.load();
        assert_eq!(config.effect, Effect::Twinkle);
        assert_eq!(config.brightness, PersistedConfig::default().brightness);

        // The bad entry is overwritten by the next write
        assert!(store.set_u8(KEY_BRIGHTNESS, 90).unwrap());
        assert_eq!(store.get_u8(KEY_BRIGHTNESS).unwrap(), Some(90));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_file_store_commits_from_a_worker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let written = tokio::spawn({
            let path = path.clone();
            async move {
                let mut store = ConfigStore::new(FileStore::open(&path, NAMESPACE).unwrap());
                store.set_u8(KEY_SPEED, 42).unwrap()
            }
        })
        .await
        .unwrap();
        assert!(written);

        let reopened = ConfigStore::new(FileStore::open(&path, NAMESPACE).unwrap());
        assert_eq!(reopened.get_u8(KEY_SPEED).unwrap(), Some(42));
        assert!(!path.with_extension("tmp").exists());
    }
}
