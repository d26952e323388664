mod helpers;
mod watches_test;
