use futures::StreamExt;

use skywatch_core::location::source::{GeoFix, GeoOptions, GeoSource, GeoStream};
use skywatch_core::{Coordinates, LocationError};

/// Device source backed by a configured observer position.
///
/// A server has no GPS; a fixed antenna/observatory position from the
/// config file plays the role of the device fix and resolves immediately.
pub struct FixedGeoSource {
    fix: GeoFix,
}

impl FixedGeoSource {
    pub fn new(latitude: f64, longitude: f64, accuracy_m: f64) -> Self {
        Self {
            fix: GeoFix {
                coordinates: Coordinates::new(latitude, longitude),
                accuracy_m,
            },
        }
    }
}

impl GeoSource for FixedGeoSource {
    fn watch(&self, _options: &GeoOptions) -> GeoStream {
        tokio_stream::once(Ok(self.fix.clone())).boxed()
    }
}

/// Host has no device location capability at all: the watch reports that
/// immediately and the cascade moves on to the IP fallback.
pub struct UnsupportedGeoSource;

impl GeoSource for UnsupportedGeoSource {
    fn watch(&self, _options: &GeoOptions) -> GeoStream {
        tokio_stream::once(Err(LocationError::Unsupported)).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn fixed_source_yields_one_fix() {
        let source = FixedGeoSource::new(69.65, 18.96, 25.0);
        let mut stream = source.watch(&GeoOptions::default());

        let fix = stream.next().await.unwrap().unwrap();
        assert_eq!(fix.coordinates, Coordinates::new(69.65, 18.96));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unsupported_source_errors_immediately() {
        let mut stream = UnsupportedGeoSource.watch(&GeoOptions::default());
        assert_eq!(
            stream.next().await.unwrap().unwrap_err(),
            LocationError::Unsupported
        );
    }
}
