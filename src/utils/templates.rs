use chrono::DateTime;
use minijinja::Environment;

const TEMPLATES: &[(&str, &str)] = &[
    ("base.html", include_str!("../../templates/base.html")),
    ("overview.html", include_str!("../../templates/overview.html")),
    ("tour.html", include_str!("../../templates/tour.html")),
    ("login.html", include_str!("../../templates/login.html")),
    ("account.html", include_str!("../../templates/account.html")),
    ("error.html", include_str!("../../templates/error.html")),
    ("emails/base.html", include_str!("../../templates/emails/base.html")),
    ("emails/welcome.html", include_str!("../../templates/emails/welcome.html")),
    ("emails/welcome.txt", include_str!("../../templates/emails/welcome.txt")),
    ("emails/password_reset.html", include_str!("../../templates/emails/password_reset.html")),
    ("emails/password_reset.txt", include_str!("../../templates/emails/password_reset.txt")),
];

/// Page and email templates, compiled into the binary.
pub fn environment() -> Result<Environment<'static>, minijinja::Error> {
    let mut env = Environment::new();
    for (name, source) in TEMPLATES {
        env.add_template(name, source)?;
    }
    env.add_filter("month_year", month_year);
    env.add_filter("first_word", first_word);
    env.add_filter("lines", lines);
    Ok(env)
}

/// `2021-06-19T09:00:00Z` -> `June 2021`. Unparseable input is returned unchanged.
fn month_year(value: String) -> String {
    DateTime::parse_from_rfc3339(&value)
        .map(|dt| dt.format("%B %Y").to_string())
        .unwrap_or(value)
}

fn first_word(value: String) -> String {
    value.split_whitespace().next().unwrap_or_default().to_string()
}

fn lines(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use minijinja::context;

    #[test]
    fn all_templates_compile() {
        let env = environment().unwrap();
        for (name, _) in TEMPLATES {
            assert!(env.get_template(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn formats_start_dates() {
        assert_eq!(month_year("2021-06-19T09:00:00Z".into()), "June 2021");
        assert_eq!(month_year("soon".into()), "soon");
        assert_eq!(first_word("Lourdes Browning".into()), "Lourdes");
        assert_eq!(lines(Some("a\n\n b ".into())), vec!["a", "b"]);
        assert!(lines(None).is_empty());
    }

    #[test]
    fn error_page_shows_message() {
        let env = environment().unwrap();
        let html = env
            .get_template("error.html")
            .unwrap()
            .render(context! { title => "Something went wrong!", msg => "There is no tour with that name." })
            .unwrap();
        assert!(html.contains("There is no tour with that name."));
        assert!(html.contains("Something went wrong!"));
    }
}
