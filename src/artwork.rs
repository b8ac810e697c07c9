//! Header and footer markup stamped on every exported page.
//!
//! Chrome renders these templates in an isolated context, so the stylesheet
//! travels inside each template and images must be inline data URIs. The
//! `pageNumber` and `date` classes are filled in by Chrome at print time.

use crate::branding::Branding;
use crate::RenderConfig;

const LICENSE_URL: &str = "https://creativecommons.org/licenses/by-nc-sa/3.0/us/";
const LICENSE_TEXT: &str = "CC BY-NC-SA 3.0 US";

/// Composed header and footer templates
#[derive(Debug, Clone, PartialEq)]
pub struct Artwork {
    pub header: String,
    pub footer: String,
}

impl Artwork {
    /// Compose templates for one page.
    ///
    /// `prefix` is the running-head label taken from the page title; it is
    /// printed as `"{prefix}."` in front of the page number.
    pub fn compose(branding: &Branding, prefix: Option<&str>, config: &RenderConfig) -> Self {
        let css = stylesheet(&branding.color);
        Self {
            header: format!("{}{}", css, header_markup(branding, config)),
            footer: format!("{}{}", css, footer_markup(branding, prefix, config)),
        }
    }
}

/// Running-head label for a title prefix.
pub fn running_head(prefix: Option<&str>) -> String {
    prefix.map(|p| format!("{}.", p)).unwrap_or_default()
}

fn stylesheet(color: &str) -> String {
    let rules = [
        "#mainH {display:flex; margin: -1px 40px 0 40px; width: 100vw}".to_string(),
        format!("#mainF {{display:flex; margin: -1px 50px 0 50px; width: 100vw; font-size:7px; justify-content: center; background-color: {color}; border-radius: 10px; padding:0px 8px;}}"),
        format!("#library {{background-color: {color}; flex:1; display:inline-flex; justify-content:flex-end; border-radius: 0 7px 7px 0; margin:5px 0}}"),
        "* { -webkit-print-color-adjust: exact}".to_string(),
        ".date, .pageNumber {display: inline-block}".to_string(),
        ".added {padding: 0px 4px}".to_string(),
        "a {text-decoration:none; color: white}".to_string(),
        format!(".trapezoid {{position:relative; display:inline-block; border-bottom: 20px solid {color}; border-right: 0px solid transparent; border-left: 8px solid transparent; width: 9px; top: -10px; left: 1px}}"),
        format!(".trapezoid:before {{content:' '; left:-8px; top:37px; position:absolute; background: {color}; border-radius:80px 0px 0px 80px; width:17px; height:8px}}"),
        format!(".trapezoid:after {{content:' '; left:-1px; top:15px; position:absolute; background: {color}; border-radius:75px 0px 0px 80px; width:10px; height:19px}}"),
    ];
    format!("<style>{}</style>", rules.join(""))
}

fn image(data: Option<&str>, height: u32, style: &str) -> String {
    match data {
        Some(data) => format!(
            r#"<img src="data:image/png;base64,{data}" height="{height}" style="{style}"/>"#
        ),
        None => String::new(),
    }
}

fn header_markup(branding: &Branding, config: &RenderConfig) -> String {
    let master = image(
        branding.master_logo.as_deref(),
        30,
        "padding:5px; background-color: white; margin-right: 10px",
    );
    let library = image(branding.logo.as_deref(), 20, "padding:5px;");
    let library_url = if branding.key.is_empty() {
        config.home_url.clone()
    } else {
        format!("https://{}.{}", branding.key, config.site_domain)
    };
    format!(
        r#"<div id="mainH"><a href="{home}" style="display: inline-block">{master}</a><div class="trapezoid"></div><div id="library"><a href="{library_url}" style="width: fit-content">{library}</a></div></div>"#,
        home = config.home_url,
    )
}

fn footer_markup(branding: &Branding, prefix: Option<&str>, config: &RenderConfig) -> String {
    let color = &branding.color;
    let attribution = config.attribution.as_deref().unwrap_or("");
    let powered_by = if attribution.is_empty() {
        ""
    } else {
        "<div class='added'>Powered by LibreTextsPDF:</div>"
    };
    format!(
        concat!(
            r#"<div id="mainF">"#,
            r#"<div style="flex:1; display:inline-flex; align-items: center; justify-content: flex-start; color:#F5F5F5;">{attribution}<div class='added'><a href="{license_url}">{license}</a></div></div>"#,
            r#"<div style="background-color: white; border: 1px solid {color}; color: {color}; padding: 2px; border-radius: 10px; min-width: 10px; text-align: center; font-size: 8px">{head}<div class="pageNumber"></div></div>"#,
            r#"<div style="flex:1; display:inline-flex; align-items: center; justify-content: flex-end; color:#F5F5F5;">{powered_by}<div>Updated <div class="date"></div></div></div>"#,
            "</div>",
        ),
        attribution = attribution,
        license_url = LICENSE_URL,
        license = LICENSE_TEXT,
        color = color,
        head = running_head(prefix),
        powered_by = powered_by,
    )
}
