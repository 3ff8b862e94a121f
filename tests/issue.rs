mod common;

use common::{lines_pdf, Harness};
use folio_harness::ingest::FileIngest;
use folio_harness::issue::{article_doc_id, ArticleInput};
use folio_harness::metadata::MetadataInput;
use folio_harness::slice::page_count;
use folio_harness::store::Filter;
use folio_harness::IngestError;

/// Six physical pages; printed page numbers start on physical page 3.
fn issue_pdf() -> Vec<u8> {
    lines_pdf(&[
        &["SOTSIAALTOO", "Issue 2021/3"],
        &[
            "Sisukord",
            "Care at home - Mari Tamm .......... 1",
            "Youth work today - Jaan Kask .......... 3",
        ],
        &["Care at home", "Mari Tamm", "Home care keeps older people independent."],
        &["Families report that visits ease daily life."],
        &["Youth work today", "Jaan Kask", "Open youth centres reach teenagers."],
        &["Street work complements the centres."],
    ])
}

async fn register_issue(h: &Harness) {
    let path = h.write_file("issue.pdf", &issue_pdf());
    h.pipeline
        .ingest_file(FileIngest {
            path,
            doc_id: Some("sotsiaaltoo-2021-3".into()),
            meta: MetadataInput {
                title: Some("Sotsiaaltoo 2021/3".into()),
                journal_title: Some("Sotsiaaltoo".into()),
                issue_label: Some("2021/3".into()),
                year: Some(2021.into()),
                ..Default::default()
            },
            ..Default::default()
        })
        .await
        .unwrap();
}

fn article(title: &str, range: &str) -> ArticleInput {
    ArticleInput {
        title: Some(title.into()),
        page_range: Some(range.into()),
        ..Default::default()
    }
}

#[tokio::test]
async fn parse_issue_finds_toc_and_offset() {
    let h = Harness::new();
    register_issue(&h).await;

    let parsed = h
        .pipeline
        .parse_issue("sotsiaaltoo-2021-3", None, None)
        .await
        .unwrap();

    assert_eq!(parsed.page_count, 6);
    assert_eq!(parsed.toc_pages, vec![2]);
    assert_eq!(parsed.found_toc_items, 2);
    assert_eq!(parsed.auto_offset, Some(2));
    assert_eq!(parsed.using_offset, 2);

    let first = &parsed.drafts[0];
    assert_eq!(first.title, "Care at home");
    assert_eq!(first.authors, vec!["Mari Tamm"]);
    assert_eq!(first.page_range, "1–2");
    assert_eq!((first.start_page, first.end_page), (3, Some(4)));

    let last = &parsed.drafts[1];
    assert_eq!(last.start_page, 5);
    assert_eq!(last.end_page, None);
}

#[tokio::test]
async fn explicit_offset_overrides_inferred() {
    let h = Harness::new();
    register_issue(&h).await;

    let parsed = h
        .pipeline
        .parse_issue("sotsiaaltoo-2021-3", Some(0), None)
        .await
        .unwrap();
    assert_eq!(parsed.auto_offset, Some(2));
    assert_eq!(parsed.using_offset, 0);
    assert_eq!(parsed.drafts[0].start_page, 1);
}

#[tokio::test]
async fn ingest_articles_slices_and_registers_each_article() {
    let h = Harness::new();
    register_issue(&h).await;

    let mut care = article("Care at home", "1-2");
    care.authors = Some(vec!["Mari Tamm".to_string()].into());
    let youth = article("Youth work today", "3-4");
    let untitled = ArticleInput {
        page_range: Some("5".into()),
        ..Default::default()
    };

    let report = h
        .pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[care, youth, untitled])
        .await
        .unwrap();
    assert_eq!(report.count, 2);
    assert_eq!(report.skipped, vec![2]);

    let care_id = article_doc_id("sotsiaaltoo-2021-3", "Care at home");
    let entry = h.pipeline.registry().get(&care_id).await.unwrap().unwrap();
    assert_eq!(entry.source.parent_doc_id.as_deref(), Some("sotsiaaltoo-2021-3"));
    assert_eq!((entry.source.start_page, entry.source.end_page), (Some(3), Some(4)));
    assert_eq!(entry.source.print_start, Some(1));
    assert_eq!(entry.meta.issue_id.as_deref(), Some("sotsiaaltoo-2021-3"));
    assert_eq!(entry.meta.article_id.as_deref(), Some(care_id.as_str()));
    assert_eq!(entry.meta.journal_title.as_deref(), Some("Sotsiaaltoo"));
    assert_eq!(entry.meta.year, Some(2021));
    assert_eq!(entry.meta.page_range.as_deref(), Some("1-2"));

    let ids = h.store.ids_matching(&Filter::doc_id(&care_id));
    assert_eq!(ids.len(), 1);
    let record = h.store.get(&ids[0]).unwrap();
    assert_eq!(record.metadata.page, Some(1));
    assert!(record.text.contains("Home care keeps older people independent."));
    assert!(!record.text.contains("Open youth centres"));

    let pdf = h.pipeline.article_pdf(&care_id).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 2);
}

#[tokio::test]
async fn explicit_physical_pages_win_over_offset() {
    let h = Harness::new();
    register_issue(&h).await;

    let mut youth = article("Youth work today", "3-4");
    youth.start_page = Some(5);
    youth.end_page = Some(5);
    youth.offset = Some(100);
    h.pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[youth])
        .await
        .unwrap();

    let id = article_doc_id("sotsiaaltoo-2021-3", "Youth work today");
    let pdf = h.pipeline.article_pdf(&id).await.unwrap();
    assert_eq!(page_count(&pdf).unwrap(), 1);
}

#[tokio::test]
async fn out_of_bounds_article_rejects_whole_batch() {
    let h = Harness::new();
    register_issue(&h).await;

    let err = h
        .pipeline
        .ingest_articles(
            "sotsiaaltoo-2021-3",
            &[article("Care at home", "1-2"), article("Ghost", "9-12")],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Range { page_count: 6, .. }), "{err:?}");
    assert_eq!(h.pipeline.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn malformed_range_is_validation_error() {
    let h = Harness::new();
    register_issue(&h).await;

    let err = h
        .pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[article("Care at home", "abc")])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)));
}

#[tokio::test]
async fn printed_range_past_u32_is_rejected() {
    let h = Harness::new();
    register_issue(&h).await;

    let mut huge = article("Care at home", "4294967295");
    huge.start_page = Some(3);
    huge.end_page = Some(4);
    let err = h
        .pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[huge])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)), "{err:?}");
    assert_eq!(h.pipeline.list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn huge_offset_is_rejected() {
    let h = Harness::new();
    register_issue(&h).await;

    let mut shifted = article("Care at home", "1-2");
    shifted.offset = Some(i64::MAX);
    let err = h
        .pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[shifted])
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Validation(_)), "{err:?}");

    assert!(matches!(
        h.pipeline
            .parse_issue("sotsiaaltoo-2021-3", Some(i64::MAX), None)
            .await,
        Err(IngestError::Validation(_))
    ));
}

#[tokio::test]
async fn article_reindex_reslices_from_issue() {
    let h = Harness::new();
    register_issue(&h).await;
    let report = h
        .pipeline
        .ingest_articles("sotsiaaltoo-2021-3", &[article("Care at home", "1-2")])
        .await
        .unwrap();

    let id = &report.inserted[0].doc_id;
    let again = h.pipeline.reindex(id).await.unwrap();
    assert_eq!(again.chunk_ids, report.inserted[0].chunk_ids);
}

#[tokio::test]
async fn unknown_issue_is_not_found() {
    let h = Harness::new();
    assert!(matches!(
        h.pipeline.parse_issue("missing", None, None).await,
        Err(IngestError::NotFound(_))
    ));
    assert!(matches!(
        h.pipeline
            .ingest_articles("missing", &[article("A", "1")])
            .await,
        Err(IngestError::NotFound(_))
    ));
}
