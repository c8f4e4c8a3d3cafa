use std::time::Duration;

use execgate::policy::{ActionKind, ActionSpec, delay_from_millis};
use execgate::template::{TemplateValues, render};
use proptest::prelude::*;

// Values that can never form a `#TOKEN#` on their own.
fn plain_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9/._ -]{0,16}"
}

fn values_strategy() -> impl Strategy<Value = (String, String, String, String, String, u64)> {
    (
        plain_value(),
        plain_value(),
        plain_value(),
        plain_value(),
        plain_value(),
        any::<u64>(),
    )
}

const TOKENS: [&str; 6] = [
    "#USER#",
    "#ACCOUNT#",
    "#BASEPATH#",
    "#FILE#",
    "#COMMAND#",
    "#SPECIALID#",
];

proptest! {
    #[test]
    fn rendered_templates_hold_no_fixed_tokens(
        picks in proptest::collection::vec((0..TOKENS.len(), plain_value()), 0..8),
        (user, account, base, file, command, id) in values_strategy(),
    ) {
        let template: String = picks
            .iter()
            .map(|(i, filler)| format!("{filler}{}", TOKENS[*i]))
            .collect();
        let values = TemplateValues {
            user: &user,
            account: &account,
            base_path: &base,
            file: &file,
            command_label: &command,
            transfer_id: id,
        };

        let out = render(&template, &values);
        for token in TOKENS {
            prop_assert!(!out.contains(token), "{token} left in {out:?}");
        }
    }

    #[test]
    fn leading_uuid_token_is_kept(tail in plain_value()) {
        let values = TemplateValues {
            user: "u",
            account: "a",
            base_path: "/b",
            file: "/f",
            command_label: "STOR",
            transfer_id: 1,
        };
        let template = format!("#UUID#{tail}#UUID#");
        prop_assert_eq!(render(&template, &values), template);
    }

    #[test]
    fn blank_action_keeps_the_fallback(blank in "[ \t]{0,4}", ms in 0u64..100_000) {
        let fallback = ActionSpec::parse(
            "EXECUTE /opt/hook",
            Duration::from_millis(70),
            &ActionSpec::none(),
        );
        let parsed = ActionSpec::parse(&blank, delay_from_millis(ms), &fallback);
        prop_assert_eq!(parsed, fallback);
    }

    #[test]
    fn refused_prefix_always_refuses(rest in plain_value(), ms in 0u64..100_000) {
        let line = format!("REFUSED{rest}");
        let parsed = ActionSpec::parse(&line, delay_from_millis(ms), &ActionSpec::none());
        prop_assert_eq!(parsed.kind, ActionKind::Refused);
        prop_assert!(parsed.refused);
    }

    #[test]
    fn delays_are_whole_tens_of_millis(ms in any::<u32>()) {
        let delay = delay_from_millis(u64::from(ms));
        prop_assert_eq!(delay.as_millis() % 10, 0);
        prop_assert!(delay.as_millis() <= u128::from(ms));
        prop_assert!(u128::from(ms) - delay.as_millis() < 10);
    }
}
