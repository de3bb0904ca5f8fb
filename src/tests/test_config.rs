#[cfg(test)]
mod tests {
    use crate::config::*;

    #[test]
    fn test_parse_simple_config() {
        let config_str = r#"
            server {
                listen 8080;
                root ./www;
                client_max_body_size 5000000;

                location / {
                    allow_methods GET POST;
                    index index.html;
                }
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();

        assert_eq!(servers.len(), 1);
        assert_eq!(servers[0].port, 8080);
        assert_eq!(servers[0].root, "./www");
        assert_eq!(servers[0].max_body_size, 5000000);
        assert_eq!(servers[0].locations.len(), 1);
        assert_eq!(servers[0].locations[0].path, "/");
        assert_eq!(servers[0].locations[0].methods, vec!["GET", "POST"]);
        assert_eq!(servers[0].locations[0].index.as_deref(), Some("index.html"));
    }

    #[test]
    fn test_parse_multiple_servers() {
        let config_str = r#"
            server {
                listen 8080;
                server_name first.example;
            }
            server {
                listen 8081;
                server_name second.example;
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].port, 8080);
        assert_eq!(servers[1].port, 8081);
        assert_eq!(servers[1].server_names, vec!["second.example"]);
    }

    #[test]
    fn test_size_suffixes() {
        let config_str = r#"
            server {
                listen 8080;
                client_max_body_size 2M;
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(servers[0].max_body_size, 2 * 1024 * 1024);

        let config_str = r#"
            server {
                listen 8080;
                client_max_body_size 64K;
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(servers[0].max_body_size, 64 * 1024);
    }

    #[test]
    fn test_default_body_size_is_one_mib() {
        let config_str = "server { listen 8080; }";
        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(servers[0].max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert_eq!(DEFAULT_MAX_BODY_SIZE, 1024 * 1024);
    }

    #[test]
    fn test_location_inherits_server_root() {
        let config_str = r#"
            server {
                listen 8080;
                root ./www;

                location /files {
                }
                location /other {
                    root ./elsewhere;
                }
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(servers[0].locations[0].root, "./www");
        assert_eq!(servers[0].locations[1].root, "./elsewhere");
    }

    #[test]
    fn test_error_pages_and_cgi_ext() {
        let config_str = r#"
            server {
                listen 8080;
                error_page 404 ./www/404.html;
                error_page 500 ./www/500.html;

                location /cgi {
                    cgi_ext .py .php;
                    allow_methods GET POST;
                }
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(
            servers[0].error_pages.get(&404).map(String::as_str),
            Some("./www/404.html")
        );
        assert_eq!(
            servers[0].error_pages.get(&500).map(String::as_str),
            Some("./www/500.html")
        );
        assert_eq!(servers[0].locations[0].cgi_extensions, vec![".py", ".php"]);
    }

    #[test]
    fn test_redirect_directive() {
        let config_str = r#"
            server {
                listen 8080;
                location /old {
                    return 301 /new;
                }
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(
            servers[0].locations[0].redirect,
            Some((301, "/new".to_string()))
        );
    }

    #[test]
    fn test_comments_are_ignored() {
        let config_str = r#"
            # front server
            server {
                listen 8080; # the usual port
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert_eq!(servers[0].port, 8080);
    }

    #[test]
    fn test_invalid_config() {
        assert!(parse_config_string("invalid syntax here").is_err());
        assert!(parse_config_string("").is_err());
    }

    #[test]
    fn test_unterminated_block_is_fatal() {
        let config_str = "server { listen 8080;";
        assert!(parse_config_string(config_str).is_err());
    }

    #[test]
    fn test_unknown_directive_is_fatal() {
        let config_str = "server { listen 8080; frobnicate on; }";
        assert!(parse_config_string(config_str).is_err());
    }

    #[test]
    fn test_invalid_port_rejected() {
        assert!(parse_config_string("server { listen 0; }").is_err());
        assert!(parse_config_string("server { listen 99999; }").is_err());
        assert!(parse_config_string("server { listen banana; }").is_err());
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let config_str = r#"
            server {
                listen 8080;
                location / {
                    allow_methods GET PUT;
                }
            }
        "#;
        assert!(parse_config_string(config_str).is_err());
    }

    #[test]
    fn test_autoindex_flag() {
        let config_str = r#"
            server {
                listen 8080;
                location /browse {
                    autoindex on;
                }
            }
        "#;

        let servers = parse_config_string(config_str).unwrap();
        assert!(servers[0].locations[0].autoindex);
        assert!(parse_config_string("server { listen 1; location / { autoindex maybe; } }").is_err());
    }
}
