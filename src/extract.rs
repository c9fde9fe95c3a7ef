use std::collections::HashMap;

/// A trait to look up request headers by name in order to resolve trusted information
pub trait RequestHeaders {
    /// Get the first value of a header
    ///
    /// Names are matched case-insensitively. Implementations return `None` when the header is
    /// missing or when its value is not visible ASCII.
    fn header(&self, name: &str) -> Option<&str>;

    /// Get the first value of the first header present with a non empty value
    fn first_header<'a, I, S>(&'a self, names: I) -> Option<&'a str>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .find_map(|name| self.header(name.as_ref()).filter(|value| !value.is_empty()))
    }
}

impl<T: RequestHeaders + ?Sized> RequestHeaders for &T {
    fn header(&self, name: &str) -> Option<&str> {
        (**self).header(name)
    }
}

impl RequestHeaders for HashMap<String, String> {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

impl RequestHeaders for [(&str, &str)] {
    fn header(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

#[cfg(feature = "http")]
mod http {
    use super::RequestHeaders;

    impl RequestHeaders for http::HeaderMap {
        fn header(&self, name: &str) -> Option<&str> {
            self.get(name).and_then(|value| value.to_str().ok())
        }
    }

    impl<T> RequestHeaders for http::Request<T> {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers().header(name)
        }
    }

    impl RequestHeaders for http::request::Parts {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers.header(name)
        }
    }
}
