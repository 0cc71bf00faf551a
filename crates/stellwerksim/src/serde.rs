pub mod time_of_day {
    use chrono::NaiveTime;
    use serde::de::{Error as DeError, IntoDeserializer};
    use serde::{Deserialize, Deserializer, Serializer};

    /// The simulator reports clock values as `H:MM:SS`, older plugin
    /// versions as `H:MM`. Leading zeros are not guaranteed.
    fn parse(value: &str) -> Result<NaiveTime, String> {
        NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
            .map_err(|why| format!("invalid time of day {value:?}: {why}"))
    }

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let formatted = time.format("%H:%M:%S").to_string();
        serializer.serialize_str(&formatted)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(D::Error::custom)
    }

    pub fn serialize_option<S>(
        option_time: &Option<NaiveTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match option_time {
            Some(t) => serialize(t, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize_option<'de, D>(
        deserializer: D,
    ) -> Result<Option<NaiveTime>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = Option::<String>::deserialize(deserializer)?;
        match s {
            // rows without a stop time come through as an empty string
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => {
                let time = deserialize(s.as_str().into_deserializer())?;
                Ok(Some(time))
            }
            None => Ok(None),
        }
    }

    #[cfg(test)]
    mod tests {
        use chrono::NaiveTime;

        #[test]
        fn parses_both_wire_formats() {
            let expected = NaiveTime::from_hms_opt(6, 45, 0).unwrap();
            assert_eq!(super::parse("6:45:00"), Ok(expected));
            assert_eq!(super::parse("06:45"), Ok(expected));
            assert!(super::parse("6h45").is_err());
        }
    }
}
