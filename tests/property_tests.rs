//! Property checks for the pure helpers.

use create_pull_request::github::strip_org_prefix_from_teams;
use create_pull_request::service::middle_branch_name;
use proptest::prelude::*;

proptest! {
    #[test]
    fn prop_team_slugs_never_contain_org(org in "[a-z][a-z0-9-]{0,12}", team in "[a-z][a-z0-9-]{0,12}") {
        let stripped = strip_org_prefix_from_teams(&[format!("{org}/{team}"), team.clone()]);
        prop_assert_eq!(stripped, vec![team.clone(), team]);
    }

    #[test]
    fn prop_middle_branch_keeps_source_prefix(source in "[a-z][a-z0-9/_-]{0,20}", target in "[a-z][a-z0-9_-]{0,20}") {
        let middle = middle_branch_name(&source, &target);
        prop_assert!(middle.starts_with(&source));
        let suffix = format!("-merge-to-{target}");
        prop_assert!(middle.ends_with(&suffix), "{} does not end with {}", middle, suffix);
        prop_assert_ne!(middle, source);
    }

}
