use sos_collector::archive::{archive_root_name, random_suffix};

#[test]
fn archive_name_follows_documented_shape_with_label_and_case() {
    let alphabet: Vec<char> = ('a'..='z').collect();
    let mut i = 0usize;
    let suffix = random_suffix(|| {
        let c = alphabet[i % alphabet.len()];
        i += 1;
        c
    });
    assert_eq!(suffix.len(), 5);

    let name = archive_root_name(Some("prod"), Some("01928374"), "2026-07-29", &suffix);
    assert!(name.starts_with("sos-collector-prod-01928374-2026-07-29-"));
    assert!(name.ends_with(&suffix));
}

#[test]
fn archive_name_without_label_or_case_still_has_date_and_suffix() {
    let name = archive_root_name(None, None, "2026-07-29", "zzzzz");
    assert_eq!(name, "sos-collector-2026-07-29-zzzzz");
}
