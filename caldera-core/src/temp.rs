//! Conversions de température partagées contrôleur/nœuds.

/// Celsius vers Fahrenheit, arrondi à 3 décimales
pub fn celsius_to_fahrenheit(celsius: f64) -> f64 {
    round3((9.0 / 5.0) * celsius + 32.0)
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celsius_to_fahrenheit() {
        assert_eq!(celsius_to_fahrenheit(0.0), 32.0);
        assert_eq!(celsius_to_fahrenheit(100.0), 212.0);
        assert_eq!(celsius_to_fahrenheit(61.0), 141.8);
        assert_eq!(celsius_to_fahrenheit(36.6667), 98.0);
    }
}
