//! Demo: drive the Range-request cache-key sharding (Component F) through a
//! full request/response cycle — strip the Range header before forwarding,
//! compose the sharded cache key, rewrite the origin's 206 to a cacheable
//! 200, then rewrite it back to 206 when serving the client, and trigger a
//! background fill when a non-Range request arrives for a URL a Range
//! request is already warming.

use iostream_core::bgfetch::{BgFetchData, BgFetchState};
use iostream_core::cachekey::{
    cache_key_for_request, restore_range_header, rewrite_for_client, rewrite_for_store,
    take_range_header,
};
use iostream_core::headers::Http11Headers;

fn main() {
    env_logger::init();

    let mut req = Http11Headers::new_request("GET", "/video.mp4", "HTTP/1.1");
    req.set_header("Range", "bytes=0-1023");

    let key = cache_key_for_request(&req, "http://origin/video.mp4");
    log::info!("cache key: {key:?}");

    let range = take_range_header(&mut req);
    log::info!("forwarding to origin without Range header: {:?}", req.field("Range"));

    let mut origin_resp = Http11Headers::new_response(206, "Partial Content", "HTTP/1.1");
    rewrite_for_store(&mut origin_resp);
    log::info!("stored status: {:?}", origin_resp.status);

    if let Some(range) = &range {
        restore_range_header(&mut req, range);
    }

    let mut client_resp = origin_resp.clone();
    rewrite_for_client(&mut client_resp);
    log::info!("served status: {:?}", client_resp.status);
    println!("served status: {}", client_resp.status.unwrap());

    let state = BgFetchState::new();
    let bg_req = Http11Headers::new_request("GET", "/video.mp4", "HTTP/1.1");
    match BgFetchData::initialize(
        state,
        "http://origin/video.mp4".into(),
        "127.0.0.1:0".parse().unwrap(),
        bg_req,
    ) {
        Ok(mut fetch) => {
            fetch.schedule();
            log::info!("background fetch scheduled for {}", fetch.url());
        }
        Err(e) => log::warn!("background fetch not started: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_range_cycle_round_trips_status() {
        let mut req = Http11Headers::new_request("GET", "/x", "HTTP/1.1");
        req.set_header("Range", "bytes=0-9");
        let key = cache_key_for_request(&req, "http://o/x").unwrap();
        assert_eq!(key, "http://o/x-bytes=0-9");

        let mut origin_resp = Http11Headers::new_response(206, "Partial Content", "HTTP/1.1");
        assert!(rewrite_for_store(&mut origin_resp));
        assert_eq!(origin_resp.status, Some(200));

        let mut client_resp = origin_resp.clone();
        assert!(rewrite_for_client(&mut client_resp));
        assert_eq!(client_resp.status, Some(206));
    }
}
