//! Some utility functions

use minidom::Element;
use url::Url;

use crate::discovery::{Configuration, Service, ServiceInfo};

/// Walks an XML tree and returns every element that has the given name
pub fn find_elems<S: AsRef<str>>(root: &Element, searched_name: S) -> Vec<&Element> {
    let searched_name = searched_name.as_ref();
    let mut elems: Vec<&Element> = Vec::new();

    for el in root.children() {
        if el.name() == searched_name {
            elems.push(el);
        } else {
            let ret = find_elems(el, searched_name);
            elems.extend(ret);
        }
    }
    elems
}

/// Returns the first direct child that has the given name
pub fn child<'a>(root: &'a Element, name: &str) -> Option<&'a Element> {
    root.children().find(|el| el.name() == name)
}

/// Returns every direct child that has the given name
pub fn children<'a>(root: &'a Element, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    root.children().filter(move |el| el.name() == name)
}

/// Resolve an `<href>` value against the URL of the request it came from.
///
/// Absolute paths have their repeated slashes collapsed, some servers are sloppy about this.
pub fn resolve_href(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    let resolved = if href.starts_with('/') {
        let mut path = String::with_capacity(href.len());
        let mut previous_was_slash = false;
        for c in href.chars() {
            if c == '/' && previous_was_slash {
                continue;
            }
            previous_was_slash = c == '/';
            path.push(c);
        }
        base.join(&path)
    } else {
        base.join(href)
    };

    match resolved {
        Ok(url) => Some(url),
        Err(err) => {
            log::debug!("Ignoring invalid href {:?}: {}", href, err);
            None
        },
    }
}

/// Returns the same URL, making sure its path ends with a `/`
pub fn with_trailing_slash(url: &Url) -> Url {
    let mut url = url.clone();
    if url.path().ends_with('/') == false {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

/// Returns the parent collection of a resource (`/a/b/` → `/a/`)
pub fn parent_collection(url: &Url) -> Option<Url> {
    let trimmed = url.path().trim_end_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    let cut = trimmed.rfind('/')?;
    let mut parent = url.clone();
    parent.set_path(&trimmed[..=cut]);
    Some(parent)
}

/// Truncate a string to at most `max_chars` characters, never splitting a character
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        None => text.to_string(),
        Some((byte_index, _)) => text[..byte_index].to_string(),
    }
}


/// A debug utility that pretty-prints a discovered configuration
pub fn print_configuration(config: &Configuration) {
    for service in [Service::CardDav, Service::CalDav].iter() {
        print_service(*service, config.service(*service));
    }
}

fn print_service(name: Service, info: Option<&ServiceInfo>) {
    let info = match info {
        None => {
            println!("{}: not available", name);
            return;
        },
        Some(info) => info,
    };

    println!("{}:", name);
    if let Some(principal) = &info.principal {
        println!("    principal  {}", principal);
    }
    if let Some(email) = &info.email {
        println!("    e-mail     {}", email);
    }
    for home_set in &info.home_sets {
        println!("    home set   {}", home_set);
    }
    for (url, collection) in &info.collections {
        let read_only = if collection.read_only { "ro" } else { "rw" };
        println!("    {:?} {} {}\t{}", collection.kind, read_only, collection.display_name.as_deref().unwrap_or("<no name>"), url);
    }
}
