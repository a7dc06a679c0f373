//! Manifest checksum lookup and directory-listing fallback

mod common;

use annotrieve_mirror::checksum::{ChecksumProbe, ManifestChecksum};
use annotrieve_mirror::config::ProbeConfig;
use annotrieve_mirror::http::build_client;
use annotrieve_mirror::probe::ProbeTarget;
use annotrieve_mirror::resolve::PathResolver;
use common::ncbi_path;
use pretty_assertions::assert_eq;
use std::time::Duration;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

const ACCESSION: &str = "GCA_000001215.4";
const SPLIT_DIR: &str = "/genomes/all/GCA/000/001/215/";

fn listing(dirs: &[&str]) -> String {
    let mut html = String::from("<html><body><pre>\n<a href=\"../\">../</a>\n");
    for dir in dirs {
        html.push_str(&format!("<a href=\"{}/\">{}/</a>\n", dir, dir));
    }
    html.push_str("</pre></body></html>");
    html
}

fn manifest(folder: &str, md5: &str) -> String {
    format!(
        "./{f}_genomic.fna\t00000000000000000000000000000000\n./{f}_genomic.gff\t{md5}\n./{f}_genomic.gtf\tffffffffffffffffffffffffffffffff\n",
        f = folder,
        md5 = md5
    )
}

fn client() -> reqwest::Client {
    build_client(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_manifest_checksum_reads_sibling_manifest() {
    let server = MockServer::start().await;
    let folder = format!("{}_Release_6_plus_ISO1_MT", ACCESSION);

    Mock::given(method("GET"))
        .and(path(format!("{}{}/uncompressed_checksums.txt", SPLIT_DIR, folder)))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest(&folder, "0123456789abcdef0123456789abcdef")))
        .expect(1)
        .mount(&server)
        .await;

    let probe = ManifestChecksum::new(client(), &ProbeConfig::default());
    let url = format!("{}{}", server.uri(), ncbi_path(ACCESSION, "Release_6_plus_ISO1_MT"));
    let results = probe
        .checksum_many(vec![
            ProbeTarget::new(url, ACCESSION),
            ProbeTarget::new(format!("{}/elsewhere/x_genomic.gff.gz", server.uri()), "GCA_999999999.1"),
        ])
        .await;

    assert_eq!(
        results,
        vec![(ACCESSION.to_string(), "0123456789abcdef0123456789abcdef".to_string())]
    );
}

#[tokio::test]
async fn test_predicted_404_resolves_through_listing() {
    let server = MockServer::start().await;
    let real_folder = format!("{}_Release_6_plus_ISO1_MT", ACCESSION);

    Mock::given(method("GET"))
        .and(path(SPLIT_DIR))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[
            "GCA_000001215.2_Release_5",
            &real_folder,
        ])))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("{}{}/uncompressed_checksums.txt", SPLIT_DIR, real_folder)))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest(&real_folder, "feedfacefeedfacefeedfacefeedface")))
        .mount(&server)
        .await;

    // Predicted with a space-mangled assembly name that does not exist
    let predicted = format!("{}{}", server.uri(), ncbi_path(ACCESSION, "Release_6_plus_ISO1_MT_(typo)"));
    let resolver = PathResolver::new(client(), &ProbeConfig::default());
    let resolution = resolver.resolve(&predicted, ACCESSION).await.unwrap();

    assert_eq!(resolution.md5, "feedfacefeedfacefeedfacefeedface");
    assert_eq!(
        resolution.url,
        format!("{}{}{}/{}_genomic.gff.gz", server.uri(), SPLIT_DIR, real_folder, real_folder)
    );
}

#[tokio::test]
async fn test_failed_candidate_manifest_moves_to_next() {
    let server = MockServer::start().await;
    let broken = format!("{}_first", ACCESSION);
    let good = format!("{}_second", ACCESSION);

    Mock::given(method("GET"))
        .and(path(SPLIT_DIR))
        .respond_with(ResponseTemplate::new(200).set_body_string(listing(&[&broken, &good])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}/uncompressed_checksums.txt", SPLIT_DIR, broken)))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("{}{}/uncompressed_checksums.txt", SPLIT_DIR, good)))
        .respond_with(ResponseTemplate::new(200).set_body_string(manifest(&good, "abababababababababababababababab")))
        .mount(&server)
        .await;

    let predicted = format!("{}{}", server.uri(), ncbi_path(ACCESSION, "nope"));
    let resolver = PathResolver::new(client(), &ProbeConfig::default());
    let results = resolver
        .resolve_many(vec![ProbeTarget::new(predicted, ACCESSION)])
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].0, ACCESSION);
    assert!(results[0].1.url.contains(&good));
}

#[tokio::test]
async fn test_unreachable_listing_is_absent() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path(SPLIT_DIR))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let predicted = format!("{}{}", server.uri(), ncbi_path(ACCESSION, "nope"));
    let resolver = PathResolver::new(client(), &ProbeConfig::default());
    assert!(resolver.resolve(&predicted, ACCESSION).await.is_none());
}
