use core::fmt;

use url::Url;

/// Base address of a running server plus the route to call on it.
#[derive(Clone, Debug)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// `None` unless `uri` is an absolute http(s) address.
    #[must_use]
    pub fn new(uri: &str) -> Option<Endpoint> {
        let url = Url::parse(uri).ok()?;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return None;
        }
        Some(Endpoint { url })
    }

    /// Appends `path` below whatever path the base already has.
    #[must_use]
    pub fn join(mut self, path: &str) -> Self {
        if let Ok(mut segments) = self.url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(path.split('/').filter(|s| !s.is_empty()));
        }
        self
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("http://localhost")]
    #[case("http://localhost:3000/")]
    #[case("https://videos.example.com/base")]
    #[trace]
    fn new_accepts_http(#[case] uri: &str) {
        // Act
        let e = Endpoint::new(uri);

        // Assert
        assert!(e.is_some());
    }

    #[rstest]
    #[case("http/localhost")]
    #[case("localhost:3000")]
    #[case("ftp://localhost")]
    #[case("mailto:admin@example.com")]
    #[case("")]
    #[trace]
    fn new_rejects_everything_else(#[case] uri: &str) {
        // Act
        let e = Endpoint::new(uri);

        // Assert
        assert!(e.is_none());
    }

    #[rstest]
    #[case("http://localhost", "upload", "http://localhost/upload")]
    #[case("http://localhost/", "/upload", "http://localhost/upload")]
    #[case("http://localhost:3000", "api/upload", "http://localhost:3000/api/upload")]
    #[case("http://localhost:3000/", "/api/upload/", "http://localhost:3000/api/upload")]
    #[case("http://host/base", "videos", "http://host/base/videos")]
    #[case("http://host/base/", "/videos", "http://host/base/videos")]
    #[case("http://host/a/b", "c/d", "http://host/a/b/c/d")]
    #[trace]
    fn join_appends_below_base(#[case] base: &str, #[case] path: &str, #[case] expected: &str) {
        // Arrange
        let e = Endpoint::new(base).unwrap();

        // Act
        let joined = e.join(path);

        // Assert
        assert_eq!(joined.to_string(), expected);
    }

    #[test]
    fn join_twice() {
        // Arrange
        let e = Endpoint::new("http://localhost").unwrap();

        // Act
        let joined = e.join("api").join("upload");

        // Assert
        assert_eq!(joined.to_string(), "http://localhost/api/upload");
    }
}
