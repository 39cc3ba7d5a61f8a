//! Department catalog source against a mock server.

use course_harvester::checkpoint::MemoryCheckpointStore;
use course_harvester::config::{HarvestConfig, DEFAULT_DESCRIPTION_SELECTOR};
use course_harvester::harvester::{HarvestState, Harvester, RunSummary};
use course_harvester::http::create_client;
use course_harvester::sources::DepartmentCatalogSource;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn html(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html")
        .set_body_string(body)
}

async fn mount_site(server: &MockServer) {
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path("/departments"))
        .respond_with(html(format!(
            r#"<html><body><table>
                <tr><th>Computer Science</th><td><a href="{uri}/cs">Website</a></td></tr>
                <tr><th>Mathematics</th><td><a href="/math">Website</a></td></tr>
            </table></body></html>"#
        )))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/cs"))
        .respond_with(html(
            r#"<html><body><nav><ul>
                <li><div><a href="/about">About</a></div></li>
                <li><div><a href="/course-catalog">Courses</a></div></li>
            </ul></nav></body></html>"#
                .to_string(),
        ))
        .mount(server)
        .await;

    // Mathematics has no navigation entry and nothing at the probed path
    Mock::given(method("GET"))
        .and(path("/math"))
        .respond_with(html("<html><body><p>Welcome</p></body></html>".to_string()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/courses"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/course-catalog"))
        .respond_with(html(
            r#"<html><body><table class="tablesaw">
                <thead><tr><th>Course</th><th>Title</th><th>Codes</th></tr></thead>
                <tbody>
                  <tr><td>COMPSCI 101</td><td><a href="/courses/compsci-101">Intro to Programming</a></td><td>QS, ZZ</td></tr>
                  <tr><td>COMPSCI 201</td><td>Data Structures</td><td>NS</td></tr>
                </tbody>
            </table></body></html>"#
                .to_string(),
        ))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/courses/compsci-101"))
        .respond_with(html(
            "<html><body><main><p>   </p><p>Learn   to program.</p></main></body></html>"
                .to_string(),
        ))
        .mount(server)
        .await;
}

async fn harvest(index_url: String) -> (RunSummary, HarvestState) {
    tokio::task::spawn_blocking(move || {
        let source = DepartmentCatalogSource::new(
            create_client().unwrap(),
            index_url,
            HarvestConfig::default().valid_curriculum_codes(),
            DEFAULT_DESCRIPTION_SELECTOR,
        )
        .unwrap();
        let mut harvester = Harvester::new(source, MemoryCheckpointStore::new()).unwrap();
        let summary = harvester.run(10, |_| {}).unwrap();
        (summary, harvester.state().clone())
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_full_harvest_against_department_sites() {
    let server = MockServer::start().await;
    mount_site(&server).await;

    let (summary, state) = harvest(format!("{}/departments", server.uri())).await;

    // Departments without a catalog are left out entirely
    let keys = state.collection_keys.as_ref().unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].code, "Computer Science");
    assert_eq!(
        keys[0].url.as_deref(),
        Some(format!("{}/course-catalog", server.uri()).as_str())
    );

    assert_eq!(summary.batch.fetched, 2);
    assert_eq!(summary.batch.fallbacks, 1);

    let records = &state.records["Computer Science"];
    assert_eq!(records[0].number, "COMPSCI 101");
    assert_eq!(records[0].description.as_deref(), Some("Learn to program."));
    assert_eq!(records[0].codes.iter().collect::<Vec<_>>(), vec!["QS"]);
    assert_eq!(
        records[0].url.as_deref(),
        Some(format!("{}/courses/compsci-101", server.uri()).as_str())
    );

    assert_eq!(records[1].number, "COMPSCI 201");
    assert_eq!(records[1].title, "Data Structures");
    assert!(records[1].description.is_none());
    assert_eq!(records[1].codes.iter().collect::<Vec<_>>(), vec!["NS"]);

    // Catalog rows carry no offering identity, so nothing is linked
    assert_eq!(summary.links_added, 0);
}
